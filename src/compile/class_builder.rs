use log::debug;

use super::{assemble, lower_method, ClassVersion, CompileError, Optimizer};
use crate::attribute_info::*;
use crate::code_attribute::MethodCode;
use crate::constant_info::{ConstantPool, FrozenPool, PoolEntry};
use crate::descriptor::{class_signature, descriptor, method_descriptor, method_signature, ClassType, Type};
use crate::field_info::{FieldAccessFlags, FieldInfo};
use crate::ir::{ClassModel, Field, Literal, Method};
use crate::method_info::{MethodAccessFlags, MethodInfo};
use crate::types::ClassFile;

const CODE: &str = "Code";
const CONSTANT_VALUE: &str = "ConstantValue";
const EXCEPTIONS: &str = "Exceptions";
const INNER_CLASSES: &str = "InnerClasses";
const SIGNATURE: &str = "Signature";
const SOURCE_FILE: &str = "SourceFile";

/// A method with its strings rendered and its body lowered and optimized,
/// waiting for the pool to be frozen.
struct PendingMethod<'a> {
    method: &'a Method,
    descriptor: String,
    signature: Option<String>,
    code: Option<MethodCode>,
}

struct PendingField<'a> {
    field: &'a Field,
    descriptor: String,
    signature: Option<String>,
    constant: Option<PoolEntry>,
}

/// Build the binary record for `model`.
///
/// Every method body is lowered and optimized first, then every pool entry
/// the class needs is registered, the pool is frozen, and only then are
/// bodies assembled against final indices.
pub fn build_class(model: &ClassModel, version: ClassVersion, optimizer: &dyn Optimizer) -> Result<ClassFile, CompileError> {
    let class_name = model.name.internal_name();
    build(model, version, optimizer).map_err(|e| e.in_class(&class_name))
}

fn build(model: &ClassModel, version: ClassVersion, optimizer: &dyn Optimizer) -> Result<ClassFile, CompileError> {
    let this = model.this_type();
    let fields = model.fields.iter().map(pending_field).collect::<Result<Vec<_>, _>>()?;
    let methods = model
        .methods
        .iter()
        .map(|method| pending_method(&this, method, optimizer))
        .collect::<Result<Vec<_>, _>>()?;

    let class_signature = model.is_generic().then(|| {
        let super_class = model.super_class.clone().unwrap_or_else(ClassType::object);
        class_signature(&model.type_params, &super_class, &model.interfaces)
    });

    // Registration order decides index order.
    let mut pool = ConstantPool::new();
    pool.add_class(&this)?;
    if let Some(super_class) = &model.super_class {
        pool.add_class(&super_class.erasure().into())?;
    }
    for interface in &model.interfaces {
        pool.add_class(&interface.erasure().into())?;
    }
    if let Some(signature) = &class_signature {
        pool.add_utf8(SIGNATURE)?;
        pool.add_utf8(signature)?;
    }
    for pending in &fields {
        register_field(&mut pool, pending)?;
    }
    for pending in &methods {
        register_method(&mut pool, pending)
            .map_err(|e| e.in_method(&pending.method.name, &pending.descriptor))?;
    }
    if !model.inner_classes.is_empty() {
        pool.add_utf8(INNER_CLASSES)?;
        for inner in &model.inner_classes {
            pool.add_class(&inner.inner.erasure().into())?;
            if let Some(outer) = &inner.outer {
                pool.add_class(&outer.erasure().into())?;
            }
            if let Some(name) = &inner.simple_name {
                pool.add_utf8(name)?;
            }
        }
    }
    if let Some(source_file) = &model.source_file {
        pool.add_utf8(SOURCE_FILE)?;
        pool.add_utf8(source_file)?;
    }
    let pool = pool.freeze();

    let field_infos = fields
        .iter()
        .map(|pending| field_info(&pool, pending))
        .collect::<Result<Vec<_>, _>>()?;
    let method_infos = methods
        .iter()
        .map(|pending| {
            method_info(&pool, pending).map_err(|e| e.in_method(&pending.method.name, &pending.descriptor))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut attributes = Vec::new();
    if let Some(signature) = &class_signature {
        attributes.push(signature_attribute(&pool, signature)?);
    }
    if !model.inner_classes.is_empty() {
        let classes = model
            .inner_classes
            .iter()
            .map(|inner| {
                Ok(InnerClassInfo {
                    inner_class_info_index: pool.class_index(&inner.inner.erasure().into())?,
                    outer_class_info_index: match &inner.outer {
                        Some(outer) => pool.class_index(&outer.erasure().into())?,
                        None => 0,
                    },
                    inner_name_index: match &inner.simple_name {
                        Some(name) => pool.utf8_index(name)?,
                        None => 0,
                    },
                    inner_class_access_flags: inner.flags,
                })
            })
            .collect::<Result<Vec<_>, CompileError>>()?;
        let body = InnerClassesAttribute {
            number_of_classes: classes.len() as u16,
            classes,
        };
        attributes.push(AttributeInfo::new(pool.utf8_index(INNER_CLASSES)?, body.to_bytes()?));
    }
    if let Some(source_file) = &model.source_file {
        let body = SourceFileAttribute {
            sourcefile_index: pool.utf8_index(source_file)?,
        };
        attributes.push(AttributeInfo::new(pool.utf8_index(SOURCE_FILE)?, body.to_bytes()?));
    }

    let interfaces = model
        .interfaces
        .iter()
        .map(|interface| pool.class_index(&interface.erasure().into()))
        .collect::<Result<Vec<_>, _>>()?;
    let super_class = match &model.super_class {
        Some(super_class) => pool.class_index(&super_class.erasure().into())?,
        None => 0,
    };
    let const_pool = pool.to_constant_info()?;
    debug!(
        "class {}: {} pool slots, {} fields, {} methods",
        model.name.internal_name(),
        pool.count(),
        field_infos.len(),
        method_infos.len()
    );

    Ok(ClassFile {
        minor_version: version.minor,
        major_version: version.major,
        const_pool_size: pool.count(),
        const_pool,
        access_flags: model.flags,
        this_class: pool.class_index(&this)?,
        super_class,
        interfaces_count: interfaces.len() as u16,
        interfaces,
        fields_count: field_infos.len() as u16,
        fields: field_infos,
        methods_count: method_infos.len() as u16,
        methods: method_infos,
        attributes_count: attributes.len() as u16,
        attributes,
    })
}

fn pending_field(field: &Field) -> Result<PendingField<'_>, CompileError> {
    let constant = match &field.constant {
        None => None,
        Some(_) if !field.flags.contains(FieldAccessFlags::STATIC) => {
            return Err(CompileError::unsupported(format!(
                "constant value on non-static field `{}`",
                field.name
            )))
        }
        Some(literal) => Some(constant_entry(literal).ok_or_else(|| {
            CompileError::unsupported(format!("field `{}` cannot hold a {:?} constant", field.name, literal))
        })?),
    };
    Ok(PendingField {
        field,
        descriptor: descriptor(&field.ty, false),
        signature: field.ty.is_generic().then(|| descriptor(&field.ty, true)),
        constant,
    })
}

/// Pool entry backing a ConstantValue attribute.
fn constant_entry(literal: &Literal) -> Option<PoolEntry> {
    Some(match literal {
        Literal::Boolean(v) => PoolEntry::Integer(i32::from(*v)),
        Literal::Char(v) => PoolEntry::Integer(i32::from(*v)),
        Literal::Byte(v) => PoolEntry::Integer(i32::from(*v)),
        Literal::Short(v) => PoolEntry::Integer(i32::from(*v)),
        Literal::Int(v) => PoolEntry::Integer(*v),
        Literal::Long(v) => PoolEntry::Long(*v),
        Literal::Float(v) => PoolEntry::Float(*v),
        Literal::Double(v) => PoolEntry::Double(*v),
        Literal::String(s) => PoolEntry::String(s.clone()),
        Literal::Class(_) | Literal::Null => return None,
    })
}

fn pending_method<'a>(this: &Type, method: &'a Method, optimizer: &dyn Optimizer) -> Result<PendingMethod<'a>, CompileError> {
    let desc = method_descriptor(&method.param_types(), &method.return_ty);
    let bodiless = method.flags.intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE);
    let code = match (&method.body, bodiless) {
        (Some(_), true) => Err(CompileError::unsupported("abstract or native method has a body")),
        (None, false) => Err(CompileError::unsupported("method has no body")),
        (None, true) => Ok(None),
        (Some(_), false) => lower_method(this, method).map(|code| Some(optimizer.optimize(code))),
    }
    .map_err(|e| e.in_method(&method.name, &desc))?;
    Ok(PendingMethod {
        method,
        signature: method.is_generic().then(|| {
            method_signature(&method.type_params, &method.param_types(), &method.return_ty, &method.exceptions)
        }),
        descriptor: desc,
        code,
    })
}

fn register_field(pool: &mut ConstantPool, pending: &PendingField) -> Result<(), CompileError> {
    pool.add_utf8(&pending.field.name)?;
    pool.add_utf8(&pending.descriptor)?;
    if let Some(signature) = &pending.signature {
        pool.add_utf8(SIGNATURE)?;
        pool.add_utf8(signature)?;
    }
    if let Some(constant) = &pending.constant {
        pool.add_utf8(CONSTANT_VALUE)?;
        pool.apply(constant.clone())?;
    }
    Ok(())
}

fn register_method(pool: &mut ConstantPool, pending: &PendingMethod) -> Result<(), CompileError> {
    pool.add_utf8(&pending.method.name)?;
    pool.add_utf8(&pending.descriptor)?;
    if let Some(signature) = &pending.signature {
        pool.add_utf8(SIGNATURE)?;
        pool.add_utf8(signature)?;
    }
    if let Some(code) = &pending.code {
        pool.add_utf8(CODE)?;
        for instr in &code.instructions {
            for entry in instr.pool_needs() {
                pool.apply(entry)?;
            }
        }
        for handler in &code.handlers {
            if let Some(ty) = &handler.catch_type {
                pool.add_class(ty)?;
            }
        }
    }
    if !pending.method.exceptions.is_empty() {
        pool.add_utf8(EXCEPTIONS)?;
        for thrown in &pending.method.exceptions {
            pool.add_class(&thrown.erasure())?;
        }
    }
    Ok(())
}

fn signature_attribute(pool: &FrozenPool, signature: &str) -> Result<AttributeInfo, CompileError> {
    let body = SignatureAttribute {
        signature_index: pool.utf8_index(signature)?,
    };
    Ok(AttributeInfo::new(pool.utf8_index(SIGNATURE)?, body.to_bytes()?))
}

fn field_info(pool: &FrozenPool, pending: &PendingField) -> Result<FieldInfo, CompileError> {
    let mut attributes = Vec::new();
    if let Some(constant) = &pending.constant {
        let body = ConstantValueAttribute {
            constantvalue_index: pool.index_of(constant)?,
        };
        attributes.push(AttributeInfo::new(pool.utf8_index(CONSTANT_VALUE)?, body.to_bytes()?));
    }
    if let Some(signature) = &pending.signature {
        attributes.push(signature_attribute(pool, signature)?);
    }
    Ok(FieldInfo {
        access_flags: pending.field.flags,
        name_index: pool.utf8_index(&pending.field.name)?,
        descriptor_index: pool.utf8_index(&pending.descriptor)?,
        attributes_count: attributes.len() as u16,
        attributes,
    })
}

fn method_info(pool: &FrozenPool, pending: &PendingMethod) -> Result<MethodInfo, CompileError> {
    let mut attributes = Vec::new();
    if let Some(code) = &pending.code {
        let assembled = assemble(code, pool)?;
        let body = CodeAttribute {
            max_stack: assembled.max_stack,
            max_locals: assembled.max_locals,
            code_length: assembled.code.len() as u32,
            code: assembled.code,
            exception_table_length: assembled.exception_table.len() as u16,
            exception_table: assembled.exception_table,
            attributes_count: 0,
            attributes: Vec::new(),
        };
        attributes.push(AttributeInfo::new(pool.utf8_index(CODE)?, body.to_bytes()?));
    }
    if !pending.method.exceptions.is_empty() {
        let exception_table = pending
            .method
            .exceptions
            .iter()
            .map(|thrown| pool.class_index(&thrown.erasure()))
            .collect::<Result<Vec<_>, _>>()?;
        let body = ExceptionsAttribute {
            exception_table_length: exception_table.len() as u16,
            exception_table,
        };
        attributes.push(AttributeInfo::new(pool.utf8_index(EXCEPTIONS)?, body.to_bytes()?));
    }
    if let Some(signature) = &pending.signature {
        attributes.push(signature_attribute(pool, signature)?);
    }
    Ok(MethodInfo {
        access_flags: pending.method.flags,
        name_index: pool.utf8_index(&pending.method.name)?,
        descriptor_index: pool.utf8_index(&pending.descriptor)?,
        attributes_count: attributes.len() as u16,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{NoopOptimizer, PeepholeOptimizer};
    use crate::constant_info::ConstantInfo;
    use crate::descriptor::{TypeArg, TypeVar};
    use crate::ir::{Body, Expr, Local, Stmt};
    use pretty_assertions::assert_eq;

    fn method(name: &str, flags: MethodAccessFlags, return_ty: Type, stmts: Vec<Stmt>) -> Method {
        Method {
            name: name.to_string(),
            flags,
            type_params: Vec::new(),
            params: Vec::new(),
            return_ty,
            exceptions: Vec::new(),
            body: Some(Body {
                stmts,
                ..Body::default()
            }),
        }
    }

    fn model() -> ClassModel {
        ClassModel::new(ClassType::from_internal("demo/Sample"), Some(ClassType::object()))
    }

    fn code_of(class: &ClassFile, index: usize) -> CodeAttribute {
        let attribute = &class.methods[index].attributes[0];
        assert_eq!(class.utf8(attribute.attribute_name_index).as_deref(), Some("Code"));
        CodeAttribute::from_bytes(&attribute.info).unwrap()
    }

    #[test]
    fn test_header_indices() {
        let mut model = model();
        model.interfaces.push(ClassType::from_internal("java/lang/Runnable"));
        let class = build_class(&model, ClassVersion::default(), &NoopOptimizer).unwrap();
        assert_eq!((class.major_version, class.minor_version), (49, 0));
        assert_eq!(class.class_name(class.this_class).as_deref(), Some("demo/Sample"));
        assert_eq!(class.class_name(class.super_class).as_deref(), Some("java/lang/Object"));
        assert_eq!(class.class_name(class.interfaces[0]).as_deref(), Some("java/lang/Runnable"));
        // Utf8 child registered before its Class entry.
        assert_eq!(class.this_class, 2);
        assert_eq!(usize::from(class.const_pool_size), class.const_pool.len() + 1);
    }

    #[test]
    fn test_root_class_has_no_super() {
        let model = ClassModel::new(ClassType::object(), None);
        let class = build_class(&model, ClassVersion::default(), &NoopOptimizer).unwrap();
        assert_eq!(class.super_class, 0);
    }

    #[test]
    fn test_return_one_plus_two_is_not_folded() {
        let mut model = model();
        model.methods.push(method(
            "f",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            Type::INT,
            vec![Stmt::Return(Some(Expr::binary(
                crate::ir::BinaryOp::Add,
                Expr::int(1),
                Expr::int(2),
                Type::INT,
            )))],
        ));
        let class = build_class(&model, ClassVersion::default(), &PeepholeOptimizer).unwrap();
        let code = code_of(&class, 0);
        assert_eq!(code.code, vec![0x04, 0x05, 0x60, 0xac]);
        assert_eq!((code.max_stack, code.max_locals), (2, 0));
        assert_eq!(class.utf8(class.methods[0].descriptor_index).as_deref(), Some("()I"));
    }

    #[test]
    fn test_void_method_gets_return() {
        let mut model = model();
        model.methods.push(method(
            "run",
            MethodAccessFlags::PUBLIC,
            Type::VOID,
            vec![Stmt::Label("done".to_string())],
        ));
        model.methods.push(method("empty", MethodAccessFlags::PUBLIC, Type::VOID, Vec::new()));
        let class = build_class(&model, ClassVersion::default(), &PeepholeOptimizer).unwrap();
        let code = code_of(&class, 0);
        assert_eq!(code.code, vec![0xb1]);
        assert_eq!(code.max_locals, 1);
        assert!(code_of(&class, 1).code.is_empty());
    }

    #[test]
    fn test_abstract_method_without_code() {
        let mut model = model();
        let mut m = method(
            "get",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            Type::INT,
            Vec::new(),
        );
        m.body = None;
        m.exceptions.push(Type::class("java/io/IOException"));
        model.methods.push(m);
        let class = build_class(&model, ClassVersion::default(), &PeepholeOptimizer).unwrap();
        let info = &class.methods[0];
        assert_eq!(info.attributes_count, 1);
        assert_eq!(class.utf8(info.attributes[0].attribute_name_index).as_deref(), Some("Exceptions"));
        let exceptions = ExceptionsAttribute::from_bytes(&info.attributes[0].info).unwrap();
        assert_eq!(
            class.class_name(exceptions.exception_table[0]).as_deref(),
            Some("java/io/IOException")
        );
    }

    #[test]
    fn test_body_rules() {
        let mut model = model();
        let mut m = method("x", MethodAccessFlags::ABSTRACT, Type::VOID, Vec::new());
        model.methods.push(m.clone());
        let err = build_class(&model, ClassVersion::default(), &NoopOptimizer).unwrap_err();
        assert!(matches!(err.root(), CompileError::UnsupportedIr(_)));
        assert!(err.to_string().starts_with("class demo/Sample: method x()V"));

        m.flags = MethodAccessFlags::PUBLIC;
        m.body = None;
        model.methods[0] = m;
        assert!(build_class(&model, ClassVersion::default(), &NoopOptimizer).is_err());
    }

    #[test]
    fn test_constant_value_field() {
        let mut model = model();
        model.fields.push(Field {
            name: "LIMIT".to_string(),
            ty: Type::LONG,
            flags: FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
            constant: Some(Literal::Long(1 << 40)),
        });
        let class = build_class(&model, ClassVersion::default(), &NoopOptimizer).unwrap();
        let field = &class.fields[0];
        assert_eq!(class.utf8(field.descriptor_index).as_deref(), Some("J"));
        let attribute = &field.attributes[0];
        assert_eq!(class.utf8(attribute.attribute_name_index).as_deref(), Some("ConstantValue"));
        let value = ConstantValueAttribute::from_bytes(&attribute.info).unwrap();
        match class.constant(value.constantvalue_index) {
            Some(ConstantInfo::Long(long)) => assert_eq!(long.value, 1 << 40),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_constant_on_instance_field_rejected() {
        let mut model = model();
        model.fields.push(Field {
            name: "x".to_string(),
            ty: Type::INT,
            flags: FieldAccessFlags::PRIVATE,
            constant: Some(Literal::Int(3)),
        });
        let err = build_class(&model, ClassVersion::default(), &NoopOptimizer).unwrap_err();
        assert!(matches!(err.root(), CompileError::UnsupportedIr(_)));
    }

    #[test]
    fn test_generic_signatures() {
        let mut model = model();
        model.type_params.push(TypeVar::new("T"));
        model.interfaces.push(
            ClassType::from_internal("java/lang/Comparable")
                .with_args(vec![TypeArg::Exact(Type::TypeVar(TypeVar::new("T")))]),
        );
        let mut m = method("id", MethodAccessFlags::PUBLIC, Type::TypeVar(TypeVar::new("T")), Vec::new());
        m.params.push(Local::new("value", Type::TypeVar(TypeVar::new("T"))));
        m.body = Some(Body {
            stmts: vec![Stmt::Return(Some(Expr::local("value")))],
            ..Body::default()
        });
        model.methods.push(m);

        let class = build_class(&model, ClassVersion::default(), &NoopOptimizer).unwrap();
        let signature = &class.attributes[0];
        assert_eq!(class.utf8(signature.attribute_name_index).as_deref(), Some("Signature"));
        let body = SignatureAttribute::from_bytes(&signature.info).unwrap();
        assert_eq!(
            class.utf8(body.signature_index).as_deref(),
            Some("<T:Ljava/lang/Object;>Ljava/lang/Object;Ljava/lang/Comparable<TT;>;")
        );
        assert_eq!(
            class.class_name(class.interfaces[0]).as_deref(),
            Some("java/lang/Comparable")
        );

        let info = &class.methods[0];
        assert_eq!(
            class.utf8(info.descriptor_index).as_deref(),
            Some("(Ljava/lang/Object;)Ljava/lang/Object;")
        );
        let body = SignatureAttribute::from_bytes(&info.attributes[1].info).unwrap();
        assert_eq!(class.utf8(body.signature_index).as_deref(), Some("(TT;)TT;"));
    }

    #[test]
    fn test_source_file_and_inner_classes() {
        let mut model = model();
        model.source_file = Some("Sample.java".to_string());
        model.inner_classes.push(crate::ir::InnerClass {
            inner: model.name.nested("Node"),
            outer: Some(model.name.clone()),
            simple_name: Some("Node".to_string()),
            flags: InnerClassAccessFlags::PRIVATE | InnerClassAccessFlags::STATIC,
        });
        let class = build_class(&model, ClassVersion::default(), &NoopOptimizer).unwrap();
        let names: Vec<_> = class
            .attributes
            .iter()
            .map(|a| class.utf8(a.attribute_name_index).unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["InnerClasses", "SourceFile"]);

        let inner = InnerClassesAttribute::from_bytes(&class.attributes[0].info).unwrap();
        let entry = &inner.classes[0];
        assert_eq!(class.class_name(entry.inner_class_info_index).as_deref(), Some("demo/Sample$Node"));
        assert_eq!(entry.outer_class_info_index, class.this_class);
        assert_eq!(class.utf8(entry.inner_name_index).as_deref(), Some("Node"));

        let source = SourceFileAttribute::from_bytes(&class.attributes[1].info).unwrap();
        assert_eq!(class.utf8(source.sourcefile_index).as_deref(), Some("Sample.java"));
    }
}
