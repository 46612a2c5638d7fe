//! Type → descriptor string encoding.
//!
//! Descriptors used for linkage (field/method references, NameAndType) are
//! always erased. Only Signature attributes are rendered with `generic` set.

mod parser;
mod types;

pub use self::parser::*;
pub use self::types::*;

/// Render `ty` as a descriptor. With `generic` unset the result is the
/// erased descriptor; with it set, type arguments and type variables are
/// kept in signature syntax.
pub fn descriptor(ty: &Type, generic: bool) -> String {
    let mut out = String::new();
    write_descriptor(ty, generic, &mut out);
    out
}

/// Erased method descriptor for the given parameters and return type.
pub fn method_descriptor(params: &[Type], ret: &Type) -> String {
    let mut out = String::from("(");
    for param in params {
        write_descriptor(param, false, &mut out);
    }
    out.push(')');
    write_descriptor(ret, false, &mut out);
    out
}

/// Class Signature attribute body: formal type parameters, superclass,
/// then each interface.
pub fn class_signature(type_params: &[TypeVar], super_class: &ClassType, interfaces: &[ClassType]) -> String {
    let mut out = String::new();
    write_formal_type_params(type_params, &mut out);
    write_class_type(super_class, true, &mut out);
    for interface in interfaces {
        write_class_type(interface, true, &mut out);
    }
    out
}

/// Method Signature attribute body.
pub fn method_signature(type_params: &[TypeVar], params: &[Type], ret: &Type, throws: &[Type]) -> String {
    let mut out = String::new();
    write_formal_type_params(type_params, &mut out);
    out.push('(');
    for param in params {
        write_descriptor(param, true, &mut out);
    }
    out.push(')');
    write_descriptor(ret, true, &mut out);
    // Thrown types only appear when one of them is a type variable or parameterized.
    if throws.iter().any(Type::is_generic) {
        for thrown in throws {
            out.push('^');
            write_descriptor(thrown, true, &mut out);
        }
    }
    out
}

fn write_formal_type_params(type_params: &[TypeVar], out: &mut String) {
    if type_params.is_empty() {
        return;
    }
    out.push('<');
    for param in type_params {
        out.push_str(&param.name);
        out.push(':');
        match &param.bound {
            Some(bound) => write_descriptor(bound, true, out),
            None => write_class_type(&ClassType::object(), true, out),
        }
    }
    out.push('>');
}

fn write_class_type(class: &ClassType, generic: bool, out: &mut String) {
    out.push('L');
    out.push_str(&class.internal_name());
    if generic && !class.args.is_empty() {
        out.push('<');
        for arg in &class.args {
            match arg {
                TypeArg::Exact(ty) => write_descriptor(ty, true, out),
                TypeArg::Extends(ty) => {
                    out.push('+');
                    write_descriptor(ty, true, out);
                }
                TypeArg::Super(ty) => {
                    out.push('-');
                    write_descriptor(ty, true, out);
                }
                TypeArg::Wildcard => out.push('*'),
            }
        }
        out.push('>');
    }
    out.push(';');
}

fn write_descriptor(ty: &Type, generic: bool, out: &mut String) {
    match ty {
        Type::Primitive(p) => out.push(p.descriptor_char()),
        Type::Array(elem) => {
            out.push('[');
            write_descriptor(elem, generic, out);
        }
        Type::Class(class) => write_class_type(class, generic, out),
        Type::Function(function) => {
            out.push('(');
            for param in &function.params {
                write_descriptor(param, generic, out);
            }
            out.push(')');
            write_descriptor(&function.ret, generic, out);
        }
        Type::TypeVar(var) if generic => {
            out.push('T');
            out.push_str(&var.name);
            out.push(';');
        }
        Type::TypeVar(var) => match &var.bound {
            Some(bound) => write_descriptor(bound, false, out),
            None => write_class_type(&ClassType::object(), false, out),
        },
        Type::Null => write_class_type(&ClassType::object(), false, out),
    }
}

/// The name stored in a Class pool entry: arrays keep their full
/// descriptor, everything else uses the bare internal name.
pub fn class_entry_name(ty: &Type) -> String {
    match ty {
        Type::Array(_) => descriptor(ty, false),
        Type::Class(class) => class.internal_name(),
        other => {
            let desc = descriptor(other, false);
            desc.strip_prefix('L')
                .and_then(|d| d.strip_suffix(';'))
                .map(str::to_string)
                .unwrap_or(desc)
        }
    }
}
