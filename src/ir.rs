//! The typed class model handed over by the front end.
//!
//! Names and types are already resolved; every expression carries enough
//! type information to select opcodes without further inference.

use crate::attribute_info::InnerClassAccessFlags;
use crate::code_attribute::InvokeMode;
use crate::descriptor::{ClassType, FunctionType, Type, TypeVar};
use crate::field_info::FieldAccessFlags;
use crate::method_info::MethodAccessFlags;
use crate::types::ClassAccessFlags;

#[derive(Clone, Debug, PartialEq)]
pub struct ClassModel {
    pub name: ClassType,
    /// `None` only for the root of the hierarchy.
    pub super_class: Option<ClassType>,
    pub interfaces: Vec<ClassType>,
    pub flags: ClassAccessFlags,
    pub type_params: Vec<TypeVar>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub inner_classes: Vec<InnerClass>,
    pub source_file: Option<String>,
}

impl ClassModel {
    pub fn new(name: ClassType, super_class: Option<ClassType>) -> Self {
        ClassModel {
            name,
            super_class,
            interfaces: Vec::new(),
            flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            type_params: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            source_file: None,
        }
    }

    pub fn this_type(&self) -> Type {
        Type::Class(self.name.clone())
    }

    /// Generic rendering differs from the erased one.
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
            || self.super_class.iter().any(|c| !c.args.is_empty())
            || self.interfaces.iter().any(|c| !c.args.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub flags: FieldAccessFlags,
    /// Compile-time constant; only meaningful on static fields.
    pub constant: Option<Literal>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InnerClass {
    pub inner: ClassType,
    /// `None` for local and anonymous classes.
    pub outer: Option<ClassType>,
    /// `None` for anonymous classes.
    pub simple_name: Option<String>,
    pub flags: InnerClassAccessFlags,
}

/// A named, typed local variable or parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Local {
    pub name: String,
    pub ty: Type,
}

impl Local {
    pub fn new(name: &str, ty: Type) -> Self {
        Local {
            name: name.to_string(),
            ty,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Method {
    pub name: String,
    pub flags: MethodAccessFlags,
    pub type_params: Vec<TypeVar>,
    pub params: Vec<Local>,
    pub return_ty: Type,
    /// Declared thrown types.
    pub exceptions: Vec<Type>,
    /// `None` for abstract and native methods.
    pub body: Option<Body>,
}

impl Method {
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn param_types(&self) -> Vec<Type> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    pub fn function_type(&self) -> FunctionType {
        FunctionType::new(self.param_types(), self.return_ty.clone())
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
            || self.return_ty.is_generic()
            || self.params.iter().any(|p| p.ty.is_generic())
            || self.exceptions.iter().any(Type::is_generic)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Body {
    /// Locals other than the parameters, allocated after them in order.
    pub locals: Vec<Local>,
    pub stmts: Vec<Stmt>,
    pub traps: Vec<Trap>,
}

/// A protected region delimited by labels placed in the statement list.
#[derive(Clone, Debug, PartialEq)]
pub struct Trap {
    pub start: String,
    /// Exclusive.
    pub end: String,
    pub handler: String,
    /// `None` catches everything.
    pub catch_type: Option<Type>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Assign { target: Place, value: Expr },
    /// Evaluate for side effects; any result is discarded.
    Eval(Expr),
    Return(Option<Expr>),
    Throw(Expr),
    Goto(String),
    /// Jump to `target` when `cond` holds.
    If { cond: Expr, target: String },
    Label(String),
    Lock(Expr),
    Unlock(Expr),
    Switch {
        key: Expr,
        cases: Vec<(i32, String)>,
        default: String,
    },
}

/// Something that can be assigned to.
#[derive(Clone, Debug, PartialEq)]
pub enum Place {
    Local(String),
    Field(FieldAccess),
    ArrayElement {
        array: Box<Expr>,
        index: Box<Expr>,
        elem: Type,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldAccess {
    pub owner: Type,
    pub name: String,
    pub ty: Type,
    /// Receiver; `None` for static fields.
    pub object: Option<Box<Expr>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub owner: Type,
    pub name: String,
    pub ty: FunctionType,
    pub mode: InvokeMode,
    /// Required for every mode except `Static`.
    pub receiver: Option<Box<Expr>>,
    pub args: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Char(u16),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(Type),
    Null,
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Boolean(_) => Type::BOOLEAN,
            Literal::Char(_) => Type::CHAR,
            Literal::Byte(_) => Type::BYTE,
            Literal::Short(_) => Type::SHORT,
            Literal::Int(_) => Type::INT,
            Literal::Long(_) => Type::LONG,
            Literal::Float(_) => Type::FLOAT,
            Literal::Double(_) => Type::DOUBLE,
            Literal::String(_) => Type::string(),
            Literal::Class(_) => Type::class("java/lang/Class"),
            Literal::Null => Type::Null,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    BitAnd,
    BitOr,
    BitXor,
    /// Short-circuit conjunction.
    And,
    /// Short-circuit disjunction.
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Local(String),
    This,
    Field(FieldAccess),
    ArrayIndex {
        array: Box<Expr>,
        index: Box<Expr>,
        elem: Type,
    },
    ArrayLength(Box<Expr>),
    Invoke(Invocation),
    /// `new C(args)`; `ctor` lists the constructor's parameter types.
    New {
        class: Type,
        ctor: Vec<Type>,
        args: Vec<Expr>,
    },
    /// Array of type `ty` with one length per allocated dimension.
    NewArray {
        ty: Type,
        dims: Vec<Expr>,
    },
    /// `ty` is the operand type (boolean for `Not`).
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        ty: Type,
    },
    /// `ty` is the operand type; comparisons and logical operators yield boolean.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        ty: Type,
    },
    InstanceOf {
        value: Box<Expr>,
        ty: Type,
    },
    /// Reference cast, or primitive conversion when both sides are primitive.
    Cast {
        value: Box<Expr>,
        ty: Type,
    },
    Convert {
        value: Box<Expr>,
        from: Type,
        to: Type,
    },
    /// The thrown value at the start of a handler.
    CaughtException(Type),
}

impl Expr {
    pub fn int(value: i32) -> Expr {
        Expr::Literal(Literal::Int(value))
    }

    pub fn local(name: &str) -> Expr {
        Expr::Local(name.to_string())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr, ty: Type) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        }
    }
}
