use nom::{
    branch::alt,
    bytes::complete::take_till1,
    character::complete::{char, one_of},
    combinator::{all_consuming, map, value},
    multi::many0,
    sequence::{delimited, terminated},
    IResult,
};
use thiserror::Error;

use super::types::*;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("malformed field descriptor `{0}`")]
    Field(String),
    #[error("malformed method descriptor `{0}`")]
    Method(String),
}

fn base_type(input: &str) -> IResult<&str, Type> {
    let (input, c) = one_of("BCDFIJSZ")(input)?;
    let prim = match c {
        'B' => PrimitiveType::Byte,
        'C' => PrimitiveType::Char,
        'D' => PrimitiveType::Double,
        'F' => PrimitiveType::Float,
        'I' => PrimitiveType::Int,
        'J' => PrimitiveType::Long,
        'S' => PrimitiveType::Short,
        _ => PrimitiveType::Boolean,
    };
    Ok((input, Type::Primitive(prim)))
}

fn object_type(input: &str) -> IResult<&str, Type> {
    let (input, _) = char('L')(input)?;
    let (input, name) = terminated(take_till1(|c| c == ';'), char(';'))(input)?;
    Ok((input, Type::Class(ClassType::from_internal(name))))
}

fn array_type(input: &str) -> IResult<&str, Type> {
    let (input, _) = char('[')(input)?;
    map(field_type_parser, Type::array)(input)
}

/// One field type: a base type, an object type or an array type.
pub fn field_type_parser(input: &str) -> IResult<&str, Type> {
    alt((base_type, object_type, array_type))(input)
}

fn return_type_parser(input: &str) -> IResult<&str, Type> {
    alt((value(Type::VOID, char('V')), field_type_parser))(input)
}

pub fn method_descriptor_parser(input: &str) -> IResult<&str, FunctionType> {
    let (input, params) = delimited(char('('), many0(field_type_parser), char(')'))(input)?;
    let (input, ret) = return_type_parser(input)?;
    Ok((input, FunctionType::new(params, ret)))
}

/// Parse a complete field descriptor, e.g. `[Ljava/lang/String;`.
pub fn parse_field_descriptor(desc: &str) -> Result<Type, DescriptorError> {
    all_consuming(field_type_parser)(desc)
        .map(|(_, ty)| ty)
        .map_err(|_| DescriptorError::Field(desc.to_string()))
}

/// Parse a complete method descriptor, e.g. `(IJ)V`.
pub fn parse_method_descriptor(desc: &str) -> Result<FunctionType, DescriptorError> {
    all_consuming(method_descriptor_parser)(desc)
        .map(|(_, f)| f)
        .map_err(|_| DescriptorError::Method(desc.to_string()))
}
