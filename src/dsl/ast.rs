//! The `.prtcl` abstract syntax tree (spec.md §6).
//!
//! A plain tagged-variant tree, not an expression-template graph (spec.md §9
//! design note: "tagged variants instead of expression templates" — the
//! original's `include/prtcl/expr/*` builds its arithmetic grammar out of
//! `boost::proto`/`yap` operator overloads; this crate just has an `Expr`
//! enum and a tree-walking compiler). Every node carries a [`Span`] so
//! [`crate::errors::ParseError`] and compile-time diagnostics can point at
//! exact source locations.

use crate::errors::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub schemes: Vec<SchemeDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemeDecl {
    pub name: String,
    pub globals: Vec<FieldDecl>,
    pub groups: Vec<GroupDecl>,
    pub procedures: Vec<ProcedureDecl>,
    pub span: Span,
}

/// `[uniform|varying] field <alias> = <type>[<shape>] <name> ;` (spec.md §6);
/// inside `global { ... }` the leading storage keyword is dropped and
/// `storage` reads as [`Storage::Global`]. `alias` is the name used inside
/// the owning scheme's procedures; `field_name` is the name the field is
/// stored under in the model, matching spec.md §6's literal `ALIAS = DTYPE
/// NAME` grammar (most schemes give a field the same alias and name; the
/// distinction exists for schemes that rename a shared model field locally).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub storage: Storage,
    pub alias: String,
    pub type_name: String,
    /// Bracketed shape extents following `type_name`, `[]` → `None` (runtime
    /// dimensionality), `[N]` → `Some(N)`.
    pub shape: Vec<Option<u32>>,
    pub field_name: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Uniform,
    Varying,
    /// A field declared inside a scheme's `global { ... }` block.
    Global,
}

/// `groups <alias> : <type> [ where <selector> ] { <field decls> }`
///
/// spec.md §6 has groups declared purely by a `select <expr> ;` clause with
/// no separate type name; this crate keeps `<alias> : <type>` as its
/// mandatory base selector (equivalent to `select type:<type>`) and layers
/// an optional `where <selector>` refinement on top — see `DESIGN.md`'s
/// grammar REDESIGN note.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDecl {
    pub alias: String,
    pub type_name: String,
    pub selector: Option<Selector>,
    pub uniform_fields: Vec<FieldDecl>,
    pub varying_fields: Vec<FieldDecl>,
    pub span: Span,
}

/// A particle selector: which groups a `groups` block, or a `let x =
/// select ...` alias, applies to.
///
/// Ported from `original_source/gt/include/prtcl/gt/misc/alias_to_particle_selector_map.hpp`.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Type(String),
    Tag(String),
    And(Box<Selector>, Box<Selector>),
    Or(Box<Selector>, Box<Selector>),
    Not(Box<Selector>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureDecl {
    pub name: String,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let <name> = <expr>;`
    Let {
        name: String,
        expr: Expr,
        span: Span,
    },
    /// `foreach <alias> { <body> }` — iterates every particle in `alias`'s
    /// group.
    Foreach {
        alias: String,
        body: Vec<Stmt>,
        span: Span,
    },
    /// `foreach_neighbor <neighbor> in <alias> { <body> }` — iterates every
    /// particle within the active kernel's support radius of the current
    /// `alias` particle.
    ForeachNeighbor {
        neighbor_alias: String,
        of_alias: String,
        body: Vec<Stmt>,
        span: Span,
    },
    /// `compute <target> <op> <expr>;` (`=`, `+=`, `-=`, `*=`, `/=`, `max=`,
    /// `min=`). Disambiguated from `reduce` by its leading keyword since both
    /// forms otherwise share the same operator spellings.
    Compute {
        target: Expr,
        op: AssignOp,
        expr: Expr,
        span: Span,
    },
    /// `reduce <target> <op> <expr>;` — accumulates into `target` across
    /// whatever loop body it appears in; the accumulation identity is
    /// determined by `op` at lowering time (spec.md §9: "reduction
    /// identities" — `+` -> 0, `*` -> 1, `max` -> -inf, `min` -> +inf).
    Reduce {
        target: Expr,
        op: ReduceOp,
        expr: Expr,
        span: Span,
    },
    /// `solve <unknown> over <group> { rhs { ... } guess { ... }
    /// system(<arg>) { ... } precond(<arg>) { ... } }` — compiles to a
    /// [`crate::pcg::solve`] call (spec.md §4.6 "Solve block"). Each block
    /// is a foreach-style body, run once per particle of `group`, that must
    /// end in a `let` binding the block's output (`b` for `rhs`, `x` for
    /// `guess`, `q` for `system`, `y` for `precond`); `system`/`precond` may
    /// nest `foreach_neighbor` to express a real matrix-vector product,
    /// with `<arg>` readable inside as `<group>.<arg>` (and, within a
    /// nested `foreach_neighbor`, as `<neighbor>.<arg>`) bound to the
    /// operator's input iterate. The converged iterate is written back into
    /// `group`'s `unknown` field, one value per particle.
    Solve {
        unknown: String,
        group: String,
        rhs: Vec<Stmt>,
        guess: Vec<Stmt>,
        system_arg: String,
        system: Vec<Stmt>,
        precond_arg: String,
        precond: Vec<Stmt>,
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Add,
    Mul,
    Max,
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64, Span),
    /// `<alias>.<field>` — a field access on the particle currently bound to
    /// `alias` by an enclosing `foreach`/`foreach_neighbor`.
    FieldAccess {
        alias: String,
        field: String,
        span: Span,
    },
    /// A bare name: either a `let`-bound local or (resolved at compile time)
    /// a global field.
    Ident(String, Span),
    Unary {
        op: BinOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Number(_, s)
            | Expr::FieldAccess { span: s, .. }
            | Expr::Ident(_, s)
            | Expr::Unary { span: s, .. }
            | Expr::Binary { span: s, .. }
            | Expr::Call { span: s, .. } => *s,
        }
    }
}
