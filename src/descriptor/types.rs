/// Types as they arrive from the front end, already resolved.
///
/// Only the shape matters here: erasure decisions have been made upstream,
/// and the backend just renders these into descriptors and signatures.

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl PrimitiveType {
    /// The reserved descriptor letter for this primitive.
    pub fn descriptor_char(self) -> char {
        match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Char => 'C',
            PrimitiveType::Short => 'S',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
            PrimitiveType::Void => 'V',
        }
    }

    /// Returns true if this type occupies two slots.
    pub fn is_wide(self) -> bool {
        matches!(self, PrimitiveType::Long | PrimitiveType::Double)
    }

    /// True for the types the VM computes on as `int`.
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            PrimitiveType::Boolean
                | PrimitiveType::Byte
                | PrimitiveType::Char
                | PrimitiveType::Short
                | PrimitiveType::Int
        )
    }

    /// `atype` operand of `newarray`.
    pub fn newarray_code(self) -> Option<u8> {
        match self {
            PrimitiveType::Boolean => Some(4),
            PrimitiveType::Char => Some(5),
            PrimitiveType::Float => Some(6),
            PrimitiveType::Double => Some(7),
            PrimitiveType::Byte => Some(8),
            PrimitiveType::Short => Some(9),
            PrimitiveType::Int => Some(10),
            PrimitiveType::Long => Some(11),
            PrimitiveType::Void => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Char => "char",
            PrimitiveType::Short => "short",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::Void => "void",
        }
    }
}

/// A named class or interface type, optionally parameterized.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassType {
    pub package: Vec<String>,
    /// Outermost class first, then each nested class.
    pub names: Vec<String>,
    pub args: Vec<TypeArg>,
}

impl ClassType {
    /// Build from an internal name such as `java/util/Map$Entry`.
    pub fn from_internal(name: &str) -> Self {
        let (package, simple) = match name.rfind('/') {
            Some(pos) => (&name[..pos], &name[pos + 1..]),
            None => ("", name),
        };
        ClassType {
            package: if package.is_empty() {
                Vec::new()
            } else {
                package.split('/').map(str::to_string).collect()
            },
            names: simple.split('$').map(str::to_string).collect(),
            args: Vec::new(),
        }
    }

    /// Build from a source-style dotted package and a simple name.
    pub fn new(package: &str, name: &str) -> Self {
        ClassType {
            package: package
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            names: vec![name.to_string()],
            args: Vec::new(),
        }
    }

    pub fn object() -> Self {
        ClassType::from_internal("java/lang/Object")
    }

    pub fn string() -> Self {
        ClassType::from_internal("java/lang/String")
    }

    /// A class nested directly inside this one.
    pub fn nested(&self, name: &str) -> Self {
        let mut names = self.names.clone();
        names.push(name.to_string());
        ClassType {
            package: self.package.clone(),
            names,
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<TypeArg>) -> Self {
        self.args = args;
        self
    }

    /// Package separators become `/`, nested classes are joined by `$`.
    pub fn internal_name(&self) -> String {
        let mut out = String::new();
        for segment in &self.package {
            out.push_str(segment);
            out.push('/');
        }
        out.push_str(&self.names.join("$"));
        out
    }

    pub fn simple_name(&self) -> &str {
        self.names.last().map(String::as_str).unwrap_or("")
    }

    pub fn erasure(&self) -> ClassType {
        ClassType {
            package: self.package.clone(),
            names: self.names.clone(),
            args: Vec::new(),
        }
    }
}

/// An actual type argument of a parameterized class type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeArg {
    Exact(Type),
    Extends(Type),
    Super(Type),
    Wildcard,
}

/// A type variable. `bound` is what it erases to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeVar {
    pub name: String,
    pub bound: Option<Box<Type>>,
}

impl TypeVar {
    pub fn new(name: &str) -> Self {
        TypeVar {
            name: name.to_string(),
            bound: None,
        }
    }

    pub fn bounded(name: &str, bound: Type) -> Self {
        TypeVar {
            name: name.to_string(),
            bound: Some(Box::new(bound)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub ret: Box<Type>,
}

impl FunctionType {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        FunctionType {
            params,
            ret: Box::new(ret),
        }
    }

    /// Slots taken by the arguments, not counting a receiver.
    pub fn arg_slots(&self) -> u16 {
        self.params.iter().map(Type::slot_size).sum()
    }

    pub fn erasure(&self) -> FunctionType {
        FunctionType {
            params: self.params.iter().map(Type::erasure).collect(),
            ret: Box::new(self.ret.erasure()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveType),
    Class(ClassType),
    Array(Box<Type>),
    Function(FunctionType),
    TypeVar(TypeVar),
    /// The type of the `null` literal.
    Null,
}

impl Type {
    pub const BOOLEAN: Type = Type::Primitive(PrimitiveType::Boolean);
    pub const BYTE: Type = Type::Primitive(PrimitiveType::Byte);
    pub const CHAR: Type = Type::Primitive(PrimitiveType::Char);
    pub const SHORT: Type = Type::Primitive(PrimitiveType::Short);
    pub const INT: Type = Type::Primitive(PrimitiveType::Int);
    pub const LONG: Type = Type::Primitive(PrimitiveType::Long);
    pub const FLOAT: Type = Type::Primitive(PrimitiveType::Float);
    pub const DOUBLE: Type = Type::Primitive(PrimitiveType::Double);
    pub const VOID: Type = Type::Primitive(PrimitiveType::Void);

    pub fn class(internal_name: &str) -> Type {
        Type::Class(ClassType::from_internal(internal_name))
    }

    pub fn object() -> Type {
        Type::Class(ClassType::object())
    }

    pub fn string() -> Type {
        Type::Class(ClassType::string())
    }

    pub fn array(elem: Type) -> Type {
        Type::Array(Box::new(elem))
    }

    /// Number of local/stack slots a value of this type takes.
    pub fn slot_size(&self) -> u16 {
        match self {
            Type::Primitive(PrimitiveType::Void) => 0,
            Type::Primitive(p) if p.is_wide() => 2,
            _ => 1,
        }
    }

    pub fn is_wide(&self) -> bool {
        self.slot_size() == 2
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveType::Void))
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Class(_) | Type::Array(_) | Type::TypeVar(_) | Type::Null
        )
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    /// True when rendering this type with generics differs from its erasure.
    pub fn is_generic(&self) -> bool {
        match self {
            Type::Primitive(_) | Type::Null => false,
            Type::Class(c) => !c.args.is_empty(),
            Type::Array(elem) => elem.is_generic(),
            Type::Function(f) => f.params.iter().any(Type::is_generic) || f.ret.is_generic(),
            Type::TypeVar(_) => true,
        }
    }

    /// The erased shape: type variables become their bound (or Object),
    /// class type arguments are dropped.
    pub fn erasure(&self) -> Type {
        match self {
            Type::Primitive(p) => Type::Primitive(*p),
            Type::Class(c) => Type::Class(c.erasure()),
            Type::Array(elem) => Type::array(elem.erasure()),
            Type::Function(f) => Type::Function(f.erasure()),
            Type::TypeVar(v) => match &v.bound {
                Some(bound) => bound.erasure(),
                None => Type::object(),
            },
            Type::Null => Type::object(),
        }
    }
}

impl From<PrimitiveType> for Type {
    fn from(p: PrimitiveType) -> Self {
        Type::Primitive(p)
    }
}

impl From<ClassType> for Type {
    fn from(c: ClassType) -> Self {
        Type::Class(c)
    }
}
