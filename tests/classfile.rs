extern crate classfile_assembler;

use classfile_assembler::attribute_info::CodeAttribute;
use classfile_assembler::compile::{ClassVersion, CompileError, CompileOptions, OutputMode};
use classfile_assembler::constant_info::ConstantInfo;
use classfile_assembler::descriptor::{
    parse_field_descriptor, parse_method_descriptor, ClassType, FunctionType, Type, TypeArg, TypeVar,
};
use classfile_assembler::field_info::FieldAccessFlags;
use classfile_assembler::ir::*;
use classfile_assembler::method_info::MethodAccessFlags;
use classfile_assembler::{class_parser, compile_class, parse_class_from_reader, write_class, ClassAccessFlags};
use indoc::indoc;
use pretty_assertions::assert_eq;

fn sample() -> ClassModel {
    let mut model = ClassModel::new(ClassType::from_internal("demo/Sample"), Some(ClassType::object()));
    model.methods.push(Method {
        name: "f".to_string(),
        flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        type_params: Vec::new(),
        params: Vec::new(),
        return_ty: Type::INT,
        exceptions: Vec::new(),
        body: Some(Body {
            stmts: vec![Stmt::Return(Some(Expr::binary(
                BinaryOp::Add,
                Expr::int(1),
                Expr::int(2),
                Type::INT,
            )))],
            ..Body::default()
        }),
    });
    model
}

fn constructor(super_class: &ClassType) -> Method {
    Method {
        name: "<init>".to_string(),
        flags: MethodAccessFlags::PUBLIC,
        type_params: Vec::new(),
        params: Vec::new(),
        return_ty: Type::VOID,
        exceptions: Vec::new(),
        body: Some(Body {
            stmts: vec![Stmt::Eval(Expr::Invoke(Invocation {
                owner: Type::Class(super_class.clone()),
                name: "<init>".to_string(),
                ty: FunctionType::new(Vec::new(), Type::VOID),
                mode: classfile_assembler::code_attribute::InvokeMode::Special,
                receiver: Some(Box::new(Expr::This)),
                args: Vec::new(),
            }))],
            ..Body::default()
        }),
    }
}

#[test]
fn test_return_one_plus_two() {
    let bytes = compile_class(&sample(), &CompileOptions::default()).unwrap();
    assert_eq!(&bytes[..8], &[0xca, 0xfe, 0xba, 0xbe, 0x00, 0x00, 0x00, 0x31]);

    let (rest, class) = class_parser(&bytes).unwrap();
    assert!(rest.is_empty());
    assert_eq!(class.access_flags, ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER);
    assert_eq!(class.class_name(class.this_class).as_deref(), Some("demo/Sample"));
    let method = &class.methods[0];
    assert_eq!(class.utf8(method.name_index).as_deref(), Some("f"));
    assert_eq!(class.utf8(method.descriptor_index).as_deref(), Some("()I"));
    let code = CodeAttribute::from_bytes(&method.attributes[0].info).unwrap();
    assert_eq!(code.code, vec![0x04, 0x05, 0x60, 0xac]);
    assert_eq!(code.max_stack, 2);
    assert_eq!(code.max_locals, 0);
    assert!(code.exception_table.is_empty());
}

#[test]
fn test_output_is_deterministic() {
    let first = compile_class(&sample(), &CompileOptions::default()).unwrap();
    let second = compile_class(&sample(), &CompileOptions::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_version_option() {
    let options = CompileOptions {
        version: ClassVersion { major: 50, minor: 3 },
        ..CompileOptions::default()
    };
    let bytes = compile_class(&sample(), &options).unwrap();
    assert_eq!(&bytes[4..8], &[0x00, 0x03, 0x00, 0x32]);
}

#[test]
fn test_disassembly_output() {
    let options = CompileOptions {
        output: OutputMode::Disassembly,
        ..CompileOptions::default()
    };
    let text = String::from_utf8(compile_class(&sample(), &options).unwrap()).unwrap();
    assert_eq!(
        text,
        indoc! {"
            class demo/Sample extends java/lang/Object
              version 49.0
              flags 0x0021
            constant pool:
              #1 = Utf8 demo/Sample
              #2 = Class #1 // demo/Sample
              #3 = Utf8 java/lang/Object
              #4 = Class #3 // java/lang/Object
              #5 = Utf8 f
              #6 = Utf8 ()I
              #7 = Utf8 Code
            methods:
              f ()I flags 0x0009
                Code: max_stack=2, max_locals=0
                  0: iconst_1
                  1: iconst_2
                  2: iadd
                  3: ireturn
        "}
    );
}

#[test]
fn test_constructor_and_fields() {
    let object = ClassType::object();
    let mut model = ClassModel::new(ClassType::from_internal("demo/Point"), Some(object.clone()));
    model.source_file = Some("Point.java".to_string());
    model.fields.push(Field {
        name: "ORIGIN_NAME".to_string(),
        ty: Type::string(),
        flags: FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        constant: Some(Literal::String("origin".to_string())),
    });
    model.fields.push(Field {
        name: "x".to_string(),
        ty: Type::INT,
        flags: FieldAccessFlags::PRIVATE,
        constant: None,
    });
    model.methods.push(constructor(&object));

    let options = CompileOptions {
        output: OutputMode::Disassembly,
        ..CompileOptions::default()
    };
    let text = String::from_utf8(compile_class(&model, &options).unwrap()).unwrap();
    assert!(text.contains("ConstantValue: \"origin\""), "{}", text);
    assert!(text.contains("0: aload_0\n"), "{}", text);
    assert!(
        text.contains("1: invokespecial #16 // java/lang/Object.<init>:()V"),
        "{}",
        text
    );
    assert!(text.ends_with("SourceFile: Point.java\n"), "{}", text);

    let bytes = compile_class(&model, &CompileOptions::default()).unwrap();
    let (_, class) = class_parser(&bytes).unwrap();
    assert_eq!(class.fields_count, 2);
    assert_eq!(class.fields[1].attributes_count, 0);
    let code = CodeAttribute::from_bytes(&class.methods[0].attributes[0].info).unwrap();
    assert_eq!(code.code, vec![0x2a, 0xb7, 0x00, 0x10, 0xb1]);
    assert_eq!((code.max_stack, code.max_locals), (1, 1));
    match class.constant(16) {
        Some(ConstantInfo::MethodRef(_)) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_try_catch_exception_table() {
    let exception = Type::class("java/lang/Exception");
    let mut model = sample();
    model.methods[0].body = Some(Body {
        locals: vec![Local::new("e", exception.clone())],
        stmts: vec![
            Stmt::Label("try".to_string()),
            Stmt::Return(Some(Expr::int(1))),
            Stmt::Label("end".to_string()),
            Stmt::Label("catch".to_string()),
            Stmt::Assign {
                target: Place::Local("e".to_string()),
                value: Expr::CaughtException(exception.clone()),
            },
            Stmt::Return(Some(Expr::int(2))),
        ],
        traps: vec![Trap {
            start: "try".to_string(),
            end: "end".to_string(),
            handler: "catch".to_string(),
            catch_type: Some(exception),
        }],
    });
    let bytes = compile_class(&model, &CompileOptions::default()).unwrap();
    let (_, class) = class_parser(&bytes).unwrap();
    let code = CodeAttribute::from_bytes(&class.methods[0].attributes[0].info).unwrap();
    // iconst_1 ireturn | astore_0 iconst_2 ireturn
    assert_eq!(code.code, vec![0x04, 0xac, 0x4b, 0x05, 0xac]);
    assert_eq!(code.exception_table.len(), 1);
    let entry = &code.exception_table[0];
    assert_eq!((entry.start_pc, entry.end_pc, entry.handler_pc), (0, 2, 2));
    assert_eq!(class.class_name(entry.catch_type).as_deref(), Some("java/lang/Exception"));
    assert_eq!((code.max_stack, code.max_locals), (1, 1));
}

#[test]
fn test_errors_name_class_and_method() {
    let mut model = sample();
    model.methods[0].body = Some(Body {
        stmts: vec![Stmt::Return(Some(Expr::local("missing")))],
        ..Body::default()
    });
    let err = compile_class(&model, &CompileOptions::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "class demo/Sample: method f()I: unsupported IR: unknown local `missing`"
    );
    assert!(matches!(err.root(), CompileError::UnsupportedIr(_)));
}

#[test]
fn test_write_and_read_back() {
    let mut out = Vec::new();
    write_class(&sample(), &CompileOptions::default(), &mut out).unwrap();
    let class = parse_class_from_reader(&mut out.as_slice()).unwrap();
    assert_eq!(class.methods_count, 1);
    assert_eq!(class.const_pool_size, 8);
}

#[test]
fn test_emitted_descriptors_parse_back() {
    let number = TypeVar::bounded("N", Type::class("java/lang/Number"));
    let mut model = ClassModel::new(ClassType::from_internal("demo/Shapes"), Some(ClassType::object()));
    model.flags |= ClassAccessFlags::ABSTRACT;
    model.type_params.push(number.clone());
    let field_types = vec![
        Type::LONG,
        Type::array(Type::array(Type::DOUBLE)),
        Type::Class(ClassType::from_internal("java/util/List").with_args(vec![TypeArg::Exact(Type::string())])),
        Type::Class(ClassType::from_internal("java/util/Map").nested("Entry")),
        Type::TypeVar(number.clone()),
    ];
    for (i, ty) in field_types.into_iter().enumerate() {
        model.fields.push(Field {
            name: format!("f{}", i),
            ty,
            flags: FieldAccessFlags::PRIVATE,
            constant: None,
        });
    }
    model.methods.push(Method {
        name: "pick".to_string(),
        flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        type_params: Vec::new(),
        params: vec![
            Local::new("a", Type::LONG),
            Local::new("b", Type::array(Type::string())),
            Local::new("c", Type::BOOLEAN),
        ],
        return_ty: Type::TypeVar(number),
        exceptions: Vec::new(),
        body: None,
    });
    model.methods.push(constructor(&ClassType::object()));

    let bytes = compile_class(&model, &CompileOptions::default()).unwrap();
    let (_, class) = class_parser(&bytes).unwrap();
    assert_eq!(class.fields.len(), model.fields.len());
    for (field, info) in model.fields.iter().zip(&class.fields) {
        let descriptor = class.utf8(info.descriptor_index).unwrap();
        assert_eq!(parse_field_descriptor(&descriptor), Ok(field.ty.erasure()), "{}", descriptor);
    }
    for (method, info) in model.methods.iter().zip(&class.methods) {
        let descriptor = class.utf8(info.descriptor_index).unwrap();
        assert_eq!(
            parse_method_descriptor(&descriptor),
            Ok(method.function_type().erasure()),
            "{}",
            descriptor
        );
    }
}
