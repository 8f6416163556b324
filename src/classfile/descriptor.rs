//! Field and method descriptor grammar: one letter or `L<internal name>;` per
//! parameter in order, then the return descriptor.

use nom::{
    branch::alt,
    bytes::complete::take_till1,
    character::complete::{char, one_of},
    combinator::{all_consuming, map},
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult,
};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid descriptor `{0}`")]
pub struct DescriptorError(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        all_consuming(field_type)(text)
            .map(|(_, ty)| ty)
            .map_err(|_| DescriptorError(text.to_string()))
    }

    pub fn slot_size(&self) -> u16 {
        match self {
            FieldType::Double | FieldType::Long => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` for `V`.
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        all_consuming(method_descriptor)(text)
            .map(|(_, desc)| desc)
            .map_err(|_| DescriptorError(text.to_string()))
    }

    /// Local slots taken by the arguments, receiver excluded.
    pub fn arg_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slot_size).sum()
    }

    pub fn return_slots(&self) -> u16 {
        self.ret.as_ref().map(FieldType::slot_size).unwrap_or(0)
    }

    /// Slot index of every argument for a method whose first argument sits at `base`.
    pub fn arg_offsets(&self, base: u16) -> Vec<u16> {
        let mut next = base;
        self.params
            .iter()
            .map(|param| {
                let slot = next;
                next += param.slot_size();
                slot
            })
            .collect()
    }
}

fn field_type(input: &str) -> IResult<&str, FieldType> {
    alt((
        map(one_of("BCDFIJSZ"), |tag| match tag {
            'B' => FieldType::Byte,
            'C' => FieldType::Char,
            'D' => FieldType::Double,
            'F' => FieldType::Float,
            'I' => FieldType::Int,
            'J' => FieldType::Long,
            'S' => FieldType::Short,
            _ => FieldType::Boolean,
        }),
        map(
            delimited(char('L'), take_till1(|c: char| c == ';'), char(';')),
            |name: &str| FieldType::Object(name.to_string()),
        ),
        map(preceded(char('['), field_type), |inner| {
            FieldType::Array(Box::new(inner))
        }),
    ))(input)
}

fn return_type(input: &str) -> IResult<&str, Option<FieldType>> {
    alt((map(char('V'), |_| None), map(field_type, Some)))(input)
}

fn method_descriptor(input: &str) -> IResult<&str, MethodDescriptor> {
    map(
        pair(delimited(char('('), many0(field_type), char(')')), return_type),
        |(params, ret)| MethodDescriptor { params, ret },
    )(input)
}
