//! A `nom`-based parser for `.prtcl` source (spec.md §6).
//!
//! The teacher crate only pulls in `nom` behind its optional `io` feature
//! (for legacy mesh formats); here it is promoted to an unconditional
//! dependency since parsing `.prtcl` source is this crate's core job, not an
//! extra (see `DESIGN.md`).

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, digit1, multispace1};
use nom::combinator::{cut, map, opt, recognize, value};
use nom::multi::{many0, separated_list0};
use nom::number::complete::double;
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::{IResult, Offset};

use super::ast::*;
use crate::errors::{ParseError, Span};

/// Parses a complete `.prtcl` source file into a [`Program`].
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    let full = source;
    let (rest, _) = skip_trivia(source).map_err(|e| to_parse_error(full, e))?;
    let (rest, schemes) = many0(|i| parse_scheme(full, i))(rest).map_err(|e| to_parse_error(full, e))?;
    let (rest, _) = skip_trivia(rest).map_err(|e| to_parse_error(full, e))?;
    if !rest.is_empty() {
        return Err(ParseError::new(locate(full, rest), "unexpected trailing input"));
    }
    Ok(Program { schemes })
}

fn to_parse_error(full: &str, e: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            ParseError::new(locate(full, e.input), "syntax error")
        }
        nom::Err::Incomplete(_) => ParseError::new(Span::default(), "incomplete input"),
    }
}

fn locate(full: &str, remaining: &str) -> Span {
    let offset = full.offset(remaining);
    let consumed = &full[..offset];
    let line = consumed.bytes().filter(|&b| b == b'\n').count() as u32 + 1;
    let column = (consumed.len() - consumed.rfind('\n').map(|i| i + 1).unwrap_or(0)) as u32 + 1;
    Span { offset, line, column }
}

/// Whitespace and `//` line comments.
fn skip_trivia(input: &str) -> IResult<&str, ()> {
    let comment = preceded(tag("//"), nom::bytes::complete::take_till(|c| c == '\n'));
    let (input, _) = many0(alt((value((), multispace1), value((), comment))))(input)?;
    Ok((input, ()))
}

fn ws<'a, O, F>(mut inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    move |input: &'a str| {
        let (input, _) = skip_trivia(input)?;
        let (input, out) = inner(input)?;
        let (input, _) = skip_trivia(input)?;
        Ok((input, out))
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        nom::character::complete::satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        many0(nom::character::complete::satisfy(|c: char| {
            c.is_ascii_alphanumeric() || c == '_'
        })),
    ))(input)
}

fn ident_string(input: &str) -> IResult<&str, String> {
    map(ws(identifier), |s: &str| s.to_string())(input)
}

fn number(full: &str, input: &str) -> IResult<&str, Expr> {
    map(ws(alt((double, map(digit1, |s: &str| s.parse().unwrap())))), |n| {
        Expr::Number(n, locate(full, input))
    })(input)
}

fn parse_selector(full: &str, input: &str) -> IResult<&str, Selector> {
    parse_selector_or(full, input)
}

fn parse_selector_or<'a>(full: &str, input: &'a str) -> IResult<&'a str, Selector> {
    let (input, first) = parse_selector_and(full, input)?;
    let (input, rest) = many0(preceded(ws(tag("or")), |i| parse_selector_and(full, i)))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, next| Selector::Or(Box::new(acc), Box::new(next))),
    ))
}

fn parse_selector_and<'a>(full: &str, input: &'a str) -> IResult<&'a str, Selector> {
    let (input, first) = parse_selector_not(full, input)?;
    let (input, rest) = many0(preceded(ws(tag("and")), |i| parse_selector_not(full, i)))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, next| Selector::And(Box::new(acc), Box::new(next))),
    ))
}

fn parse_selector_not<'a>(full: &str, input: &'a str) -> IResult<&'a str, Selector> {
    let (input, negate) = opt(ws(tag("not")))(input)?;
    let (input, atom) = parse_selector_atom(full, input)?;
    Ok((input, if negate.is_some() { Selector::Not(Box::new(atom)) } else { atom }))
}

fn parse_selector_atom<'a>(_full: &str, input: &'a str) -> IResult<&'a str, Selector> {
    alt((
        map(preceded(ws(tag("type")), preceded(ws(char(':')), ident_string)), Selector::Type),
        map(preceded(ws(tag("tag")), preceded(ws(char(':')), ident_string)), Selector::Tag),
    ))(input)
}

/// Zero or more `[<number>]`/`[]` extent groups following a `FieldDecl`'s
/// `type_name` (spec.md §6: "`SHAPE` is zero or more `[<number-or-empty>]`
/// groups; an empty `[]` denotes the runtime dimensionality N").
fn parse_shape(input: &str) -> IResult<&str, Vec<Option<u32>>> {
    many0(delimited(
        ws(char('[')),
        opt(map(digit1, |s: &str| s.parse().unwrap())),
        ws(char(']')),
    ))(input)
}

/// The shared body of a field declaration once its leading storage keyword
/// (or its absence, inside `global { ... }`) has been consumed: `field
/// <alias> = <type>[<shape>] <name> ;` (spec.md §6).
fn parse_field_body<'a>(full: &str, input: &'a str, start: &'a str, storage: Storage) -> IResult<&'a str, FieldDecl> {
    let (input, _) = ws(tag("field"))(input)?;
    let (input, alias) = ident_string(input)?;
    let (input, _) = ws(char('='))(input)?;
    let (input, type_name) = ident_string(input)?;
    let (input, shape) = parse_shape(input)?;
    let (input, field_name) = ident_string(input)?;
    let (input, _) = ws(char(';'))(input)?;
    Ok((
        input,
        FieldDecl {
            storage,
            alias,
            type_name,
            shape,
            field_name,
            span: locate(full, start),
        },
    ))
}

fn parse_group_field_decl<'a>(full: &str, input: &'a str) -> IResult<&'a str, FieldDecl> {
    let start = input;
    let (input, storage) = ws(alt((
        value(Storage::Uniform, tag("uniform")),
        value(Storage::Varying, tag("varying")),
    )))(input)?;
    parse_field_body(full, input, start, storage)
}

fn parse_global_field_decl<'a>(full: &str, input: &'a str) -> IResult<&'a str, FieldDecl> {
    let start = input;
    parse_field_body(full, input, start, Storage::Global)
}

fn parse_group_decl<'a>(full: &str, input: &'a str) -> IResult<&'a str, GroupDecl> {
    let start = input;
    let (input, _) = ws(tag("groups"))(input)?;
    let (input, alias) = ident_string(input)?;
    let (input, _) = ws(char(':'))(input)?;
    let (input, type_name) = ident_string(input)?;
    let (input, selector) = opt(preceded(ws(tag("where")), |i| parse_selector(full, i)))(input)?;
    let (input, _) = ws(char('{'))(input)?;
    let (input, fields) = many0(|i| parse_group_field_decl(full, i))(input)?;
    let (input, _) = ws(char('}'))(input)?;
    let (uniform_fields, varying_fields) = fields
        .into_iter()
        .partition(|f| f.storage == Storage::Uniform);
    Ok((
        input,
        GroupDecl {
            alias,
            type_name,
            selector,
            uniform_fields,
            varying_fields,
            span: locate(full, start),
        },
    ))
}

fn parse_expr<'a>(full: &str, input: &'a str) -> IResult<&'a str, Expr> {
    parse_additive(full, input)
}

fn parse_additive<'a>(full: &str, input: &'a str) -> IResult<&'a str, Expr> {
    let (input, first) = parse_multiplicative(full, input)?;
    let (input, rest) = many0(pair(
        ws(alt((value(BinOp::Add, char('+')), value(BinOp::Sub, char('-'))))),
        |i| parse_multiplicative(full, i),
    ))(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |lhs, (op, rhs)| Expr::Binary {
            op,
            span: lhs.span(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }),
    ))
}

fn parse_multiplicative<'a>(full: &str, input: &'a str) -> IResult<&'a str, Expr> {
    let (input, first) = parse_unary(full, input)?;
    let (input, rest) = many0(pair(
        ws(alt((value(BinOp::Mul, char('*')), value(BinOp::Div, char('/'))))),
        |i| parse_unary(full, i),
    ))(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |lhs, (op, rhs)| Expr::Binary {
            op,
            span: lhs.span(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }),
    ))
}

fn parse_unary<'a>(full: &str, input: &'a str) -> IResult<&'a str, Expr> {
    let start = input;
    let (input, minus) = opt(ws(char('-')))(input)?;
    if minus.is_some() {
        let (input, operand) = parse_unary(full, input)?;
        return Ok((
            input,
            Expr::Unary {
                op: BinOp::Sub,
                operand: Box::new(operand),
                span: locate(full, start),
            },
        ));
    }
    parse_atom(full, input)
}

fn parse_atom<'a>(full: &str, input: &'a str) -> IResult<&'a str, Expr> {
    alt((
        |i| number(full, i),
        |i| parse_call_or_field_or_ident(full, i),
        delimited(ws(char('(')), |i| parse_expr(full, i), ws(char(')'))),
    ))(input)
}

fn parse_call_or_field_or_ident<'a>(full: &str, input: &'a str) -> IResult<&'a str, Expr> {
    let start = input;
    let (input, name) = ident_string(input)?;

    let (input, open_paren) = opt(ws(char('(')))(input)?;
    if open_paren.is_some() {
        let (input, args) = separated_list0(ws(char(',')), |i| parse_expr(full, i))(input)?;
        let (input, _) = cut(ws(char(')')))(input)?;
        return Ok((
            input,
            Expr::Call {
                name,
                args,
                span: locate(full, start),
            },
        ));
    }

    let (input, dot) = opt(ws(char('.')))(input)?;
    if dot.is_some() {
        let (input, field) = ident_string(input)?;
        return Ok((
            input,
            Expr::FieldAccess {
                alias: name,
                field,
                span: locate(full, start),
            },
        ));
    }

    Ok((input, Expr::Ident(name, locate(full, start))))
}

fn parse_assign_op(input: &str) -> IResult<&str, AssignOp> {
    ws(alt((
        value(AssignOp::Add, tag("+=")),
        value(AssignOp::Sub, tag("-=")),
        value(AssignOp::Mul, tag("*=")),
        value(AssignOp::Div, tag("/=")),
        value(AssignOp::Max, tag("max=")),
        value(AssignOp::Min, tag("min=")),
        value(AssignOp::Set, tag("=")),
    )))(input)
}

fn parse_reduce_op(input: &str) -> IResult<&str, ReduceOp> {
    ws(alt((
        value(ReduceOp::Add, tag("+=")),
        value(ReduceOp::Mul, tag("*=")),
        value(ReduceOp::Max, tag("max=")),
        value(ReduceOp::Min, tag("min=")),
    )))(input)
}

fn parse_block<'a>(full: &str, input: &'a str) -> IResult<&'a str, Vec<Stmt>> {
    delimited(ws(char('{')), many0(|i| parse_stmt(full, i)), ws(char('}')))(input)
}

fn parse_stmt<'a>(full: &str, input: &'a str) -> IResult<&'a str, Stmt> {
    let start = input;
    alt((
        map(
            tuple((
                preceded(ws(tag("let")), ident_string),
                preceded(ws(char('=')), |i| parse_expr(full, i)),
                ws(char(';')),
            )),
            move |(name, expr, _)| Stmt::Let {
                name,
                expr,
                span: locate(full, start),
            },
        ),
        map(
            tuple((
                preceded(ws(tag("foreach_neighbor")), ident_string),
                preceded(ws(tag("in")), ident_string),
                |i| parse_block(full, i),
            )),
            move |(neighbor_alias, of_alias, body)| Stmt::ForeachNeighbor {
                neighbor_alias,
                of_alias,
                body,
                span: locate(full, start),
            },
        ),
        map(
            pair(preceded(ws(tag("foreach")), ident_string), |i| parse_block(full, i)),
            move |(alias, body)| Stmt::Foreach {
                alias,
                body,
                span: locate(full, start),
            },
        ),
        map(
            tuple((
                preceded(ws(tag("solve")), ident_string),
                preceded(ws(tag("over")), ident_string),
                preceded(ws(char('{')), preceded(ws(tag("rhs")), |i| parse_block(full, i))),
                preceded(ws(tag("guess")), |i| parse_block(full, i)),
                preceded(
                    ws(tag("system")),
                    pair(
                        delimited(ws(char('(')), ident_string, ws(char(')'))),
                        |i| parse_block(full, i),
                    ),
                ),
                preceded(
                    ws(tag("precond")),
                    pair(
                        delimited(ws(char('(')), ident_string, ws(char(')'))),
                        |i| parse_block(full, i),
                    ),
                ),
                ws(char('}')),
            )),
            move |(unknown, group, rhs, guess, (system_arg, system), (precond_arg, precond), _)| Stmt::Solve {
                unknown,
                group,
                rhs,
                guess,
                system_arg,
                system,
                precond_arg,
                precond,
                span: locate(full, start),
            },
        ),
        map(
            tuple((
                preceded(ws(tag("reduce")), |i| parse_expr(full, i)),
                parse_reduce_op,
                |i| parse_expr(full, i),
                ws(char(';')),
            )),
            move |(target, op, expr, _)| Stmt::Reduce {
                target,
                op,
                expr,
                span: locate(full, start),
            },
        ),
        map(
            tuple((
                preceded(ws(tag("compute")), |i| parse_expr(full, i)),
                parse_assign_op,
                |i| parse_expr(full, i),
                ws(char(';')),
            )),
            move |(target, op, expr, _)| Stmt::Compute {
                target,
                op,
                expr,
                span: locate(full, start),
            },
        ),
    ))(input)
}

fn parse_procedure<'a>(full: &str, input: &'a str) -> IResult<&'a str, ProcedureDecl> {
    let start = input;
    let (input, _) = ws(tag("procedure"))(input)?;
    let (input, name) = ident_string(input)?;
    let (input, body) = parse_block(full, input)?;
    Ok((
        input,
        ProcedureDecl {
            name,
            body,
            span: locate(full, start),
        },
    ))
}

fn parse_scheme<'a>(full: &str, input: &'a str) -> IResult<&'a str, SchemeDecl> {
    let start = input;
    let (input, _) = ws(tag("scheme"))(input)?;
    let (input, name) = ident_string(input)?;
    let (input, _) = ws(char('{'))(input)?;

    let (input, globals) = opt(preceded(
        ws(tag("global")),
        delimited(ws(char('{')), many0(|i| parse_global_field_decl(full, i)), ws(char('}'))),
    ))(input)?;
    let (input, groups) = many0(|i| parse_group_decl(full, i))(input)?;
    let (input, procedures) = many0(|i| parse_procedure(full, i))(input)?;
    let (input, _) = ws(char('}'))(input)?;

    Ok((
        input,
        SchemeDecl {
            name,
            globals: globals.unwrap_or_default(),
            groups,
            procedures,
            span: locate(full, start),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_no_op_scheme_with_a_global_field() {
        let source = r#"
            scheme gravity {
                global {
                    field g = real g;
                }
                groups fluid : particle where type:fluid and not tag:frozen {
                    varying field v = real v;
                }
                procedure apply {
                    foreach fluid {
                        compute fluid.v += g;
                    }
                }
            }
        "#;
        let program = parse_program(source).expect("valid program should parse");
        assert_eq!(program.schemes.len(), 1);
        let scheme = &program.schemes[0];
        assert_eq!(scheme.name, "gravity");
        assert_eq!(scheme.globals.len(), 1);
        assert_eq!(scheme.globals[0].storage, Storage::Global);
        assert_eq!(scheme.groups.len(), 1);
        assert_eq!(scheme.procedures.len(), 1);
        assert!(matches!(
            scheme.groups[0].selector,
            Some(Selector::And(_, _))
        ));
    }

    #[test]
    fn reports_a_span_on_malformed_input() {
        let err = parse_program("scheme { broken").unwrap_err();
        assert!(err.span.line >= 1);
    }

    /// spec.md §8 concrete scenario 2's literal mandatory test input, parsed
    /// verbatim: a scheme with only a `global` block naming a `real` field
    /// and a no-op procedure.
    #[test]
    fn parses_spec_scenario_2_literal_source() {
        let source = "scheme s { global { field h = real smoothing_scale; } procedure p { } }";
        let program = parse_program(source).expect("spec's literal scenario 2 source should parse");
        let scheme = &program.schemes[0];
        assert_eq!(scheme.name, "s");
        assert_eq!(scheme.globals.len(), 1);
        assert_eq!(scheme.globals[0].alias, "h");
        assert_eq!(scheme.globals[0].type_name, "real");
        assert_eq!(scheme.globals[0].field_name, "smoothing_scale");
        assert_eq!(scheme.globals[0].storage, Storage::Global);
        assert_eq!(scheme.procedures[0].name, "p");
        assert!(scheme.procedures[0].body.is_empty());
    }

    #[test]
    fn parses_a_solve_block_with_a_neighbor_operator() {
        let source = r#"
            scheme pressure_solve {
                groups fluid : particle {
                    varying field pressure = real pressure;
                    varying field divergence = real divergence;
                }
                procedure solve_pressure {
                    solve pressure over fluid {
                        rhs {
                            let b = fluid.divergence;
                        }
                        guess {
                            let x = fluid.pressure;
                        }
                        system(p) {
                            let q = fluid.p;
                            foreach_neighbor other in fluid {
                                compute q += other.p;
                            }
                        }
                        precond(r) {
                            let y = fluid.r;
                        }
                    }
                }
            }
        "#;
        let program = parse_program(source).expect("valid program should parse");
        let procedure = &program.schemes[0].procedures[0];
        match &procedure.body[0] {
            Stmt::Solve {
                unknown,
                group,
                rhs,
                guess,
                system_arg,
                system,
                precond_arg,
                precond,
                ..
            } => {
                assert_eq!(unknown, "pressure");
                assert_eq!(group, "fluid");
                assert_eq!(rhs.len(), 1);
                assert_eq!(guess.len(), 1);
                assert_eq!(system_arg, "p");
                assert_eq!(system.len(), 2);
                assert_eq!(precond_arg, "r");
                assert_eq!(precond.len(), 1);
            }
            other => panic!("expected Stmt::Solve, got {other:?}"),
        }
    }
}
