//! Language-neutral intermediate representation (spec.md §4.2, C2).
//!
//! The IR models files, imports, struct declarations, function
//! declarations, statements, and expressions. [`emit`] lowers a
//! [`File`] to source text for the fixed target language (Go — see
//! SPEC_FULL.md §0).

pub mod emit;

/// A single compilable source file.
#[derive(Debug, Clone, Default)]
pub struct File {
    pub package: String,
    pub imports: Vec<Import>,
    pub structs: Vec<StructDecl>,
    pub funcs: Vec<FuncDecl>,
}

impl File {
    pub fn new(package: impl Into<String>) -> Self {
        File {
            package: package.into(),
            ..Default::default()
        }
    }

    /// Adds an import if not already present, keeping the list sorted
    /// for deterministic output (spec.md §8 property 11).
    pub fn add_import(&mut self, path: impl Into<String>) {
        self.add_import_aliased(path, None);
    }

    pub fn add_import_aliased(&mut self, path: impl Into<String>, alias: Option<String>) {
        let path = path.into();
        if self.imports.iter().any(|i| i.path == path) {
            return;
        }
        self.imports.push(Import { path, alias });
        self.imports.sort_by(|a, b| a.path.cmp(&b.path));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub path: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: String,
    /// Struct tag, e.g. `db:"total_amount"`.
    pub tag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Vec<String>,
    pub body: Vec<Stmt>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: String,
}

/// Statement forms (spec.md §4.2).
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `name := expr` or `var name ty = expr`.
    VarDefine {
        name: String,
        ty: Option<String>,
        value: Option<Expr>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    If {
        /// Optional `if init; cond` short statement.
        init: Option<Box<Stmt>>,
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    ClassicFor {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    RangeFor {
        /// `for key, value := range expr { ... }`; `key` is omitted
        /// with `_` when not needed.
        key: Option<String>,
        value: String,
        over: Expr,
        body: Vec<Stmt>,
    },
    /// `value, ok := <-channel` when `ok` is Some, else `value := <-channel`.
    ChanRecv {
        value: String,
        ok: Option<String>,
        channel: Expr,
    },
    ChanSend {
        channel: Expr,
        value: Expr,
    },
    Defer(Expr),
    Go(Expr),
    Return(Vec<Expr>),
    Break,
    Continue,
    ExprStmt(Expr),
    Block(Vec<Stmt>),
    /// Escape hatch for text the IR doesn't model structurally
    /// (spec.md §4.2 "raw-snippet").
    Raw(String),
}

/// Expression forms (spec.md §4.2).
#[derive(Debug, Clone)]
pub enum Expr {
    Ident(String),
    /// A literal already formatted as target-language source
    /// (e.g. `"foo"`, `42`, `nil`).
    Literal(String),
    Selector(Box<Expr>, String),
    AddrOf(Box<Expr>),
    Binary {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: String,
        expr: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    CallVariadic {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Index(Box<Expr>, Box<Expr>),
    Slice {
        base: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
    },
    /// `Type{Field: value, ...}`.
    CompositeLit {
        ty: String,
        fields: Vec<(String, Expr)>,
    },
    Closure {
        params: Vec<Param>,
        returns: Vec<String>,
        body: Vec<Stmt>,
    },
    /// Raw expression text, used sparingly for substituted
    /// custom-expr strings (spec.md §4.3 map generator).
    Raw(String),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn selector(base: Expr, field: impl Into<String>) -> Self {
        Expr::Selector(Box::new(base), field.into())
    }

    pub fn call(func: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: Box::new(func),
            args,
        }
    }
}
