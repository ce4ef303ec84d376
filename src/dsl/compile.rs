//! Lowering a parsed [`Program`] into something runnable, and the compile
//! prepass that rejects malformed programs before that (spec.md §4.7, §9).
//!
//! The original's code generator (`gt/include/prtcl/gt/printer/cxx_openmp.hpp`)
//! emits C++ source and hands it to a real compiler at build time. Rust has
//! no equivalent hook for invoking a compiler backend against
//! runtime-parsed source, so "lowering" is reinterpreted here as producing a
//! [`CompiledScheme`]: a validated, name-resolved view of the program that
//! [`CompiledScheme::run_procedure`] interprets directly against a
//! [`crate::data::model::Model`] (spec.md §9 REDESIGN note). The observable
//! contract — same procedures, same parallel/reduction/solve semantics — is
//! unchanged; only the implementation strategy (interpret vs. compile) is.
//!
//! The interpreter evaluates `real` (`f64`) scalar expressions only. Every
//! scheme in this domain does its arithmetic over real-valued physical
//! quantities (positions, velocities, pressures, ...); boolean/integer
//! fields exist for tags and bookkeeping but are never DSL expression
//! operands, in the original as in this port — see `DESIGN.md`.

use std::collections::HashMap;

use smallvec::SmallVec;

use super::ast::*;
use crate::data::group::{Group, GroupIndex};
use crate::data::model::Model;
use crate::data::shape::Shape;
use crate::errors::SchemeError;
use crate::grid::{GroupedUniformGrid, ParticleRef};

/// Per-selector (and one global) bucket of reduce-statement targets found in
/// a procedure.
///
/// Ported from `original_source/gt/include/prtcl/gt/misc/reduction_map.hpp`'s
/// `reduce_collection`. That file's builder (`make_reduce_collection`)
/// writes into a `_map` field the class never declares — it cannot compile
/// as written (spec.md §9 Open Question). The evidently intended shape,
/// implemented here: a reduce statement nested under a `foreach <alias>`
/// accumulates into the bucket keyed by `alias`; a reduce statement at
/// procedure top level (not inside any `foreach`) accumulates into the
/// global bucket. See `DESIGN.md` Open Question decisions.
#[derive(Debug, Default, Clone)]
pub struct ReduceCollection {
    pub global: Vec<String>,
    pub per_alias: HashMap<String, Vec<String>>,
}

fn target_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Ident(name, _) => Some(name.clone()),
        Expr::FieldAccess { alias, field, .. } => Some(format!("{alias}.{field}")),
        _ => None,
    }
}

fn collect_reduces(body: &[Stmt], enclosing_alias: Option<&str>, out: &mut ReduceCollection) {
    for stmt in body {
        match stmt {
            Stmt::Reduce { target, .. } => {
                if let Some(name) = target_name(target) {
                    match enclosing_alias {
                        Some(alias) => out.per_alias.entry(alias.to_string()).or_default().push(name),
                        None => out.global.push(name),
                    }
                }
            }
            Stmt::Foreach { alias, body, .. } => collect_reduces(body, Some(alias), out),
            Stmt::ForeachNeighbor { of_alias, body, .. } => collect_reduces(body, Some(of_alias), out),
            _ => {}
        }
    }
}

/// Walks every `groups`/`let` alias introduced by a scheme and rejects
/// duplicates, mirroring `find_groups.hpp`'s prepass (spec.md §4.7 point 4):
/// a `.prtcl` program may not declare the same alias twice, whether as two
/// `groups` blocks or a `groups` block shadowed by a `let`.
fn check_duplicate_aliases(scheme: &SchemeDecl) -> Result<(), SchemeError> {
    let mut seen = std::collections::HashSet::new();
    for group in &scheme.groups {
        if !seen.insert(group.alias.clone()) {
            return Err(SchemeError::CompileError(format!(
                "duplicate alias {:?} in scheme {:?}",
                group.alias, scheme.name
            )));
        }
    }
    for procedure in &scheme.procedures {
        check_duplicate_lets(&procedure.body, &mut seen.clone())?;
    }
    Ok(())
}

fn check_duplicate_lets(body: &[Stmt], seen: &mut std::collections::HashSet<String>) -> Result<(), SchemeError> {
    for stmt in body {
        if let Stmt::Let { name, .. } = stmt {
            if !seen.insert(name.clone()) {
                return Err(SchemeError::CompileError(format!("duplicate alias {name:?}")));
            }
        }
    }
    Ok(())
}

/// A validated, name-resolved `.prtcl` scheme ready to run.
#[derive(Debug)]
pub struct CompiledScheme {
    pub decl: SchemeDecl,
    pub reduces: HashMap<String, ReduceCollection>,
}

/// Validates `program` and lowers every scheme it declares.
pub fn compile(program: &Program) -> Result<Vec<CompiledScheme>, SchemeError> {
    let mut out = Vec::with_capacity(program.schemes.len());
    for scheme in &program.schemes {
        check_duplicate_aliases(scheme)?;
        let mut reduces = HashMap::new();
        for procedure in &scheme.procedures {
            let mut collection = ReduceCollection::default();
            collect_reduces(&procedure.body, None, &mut collection);
            reduces.insert(procedure.name.clone(), collection);
        }
        out.push(CompiledScheme {
            decl: scheme.clone(),
            reduces,
        });
    }
    Ok(out)
}

/// The input iterate of a `solve` block's `system`/`precond` operator
/// (spec.md §4.6), bound into the environment for the duration of one
/// operator evaluation so `<group>.<arg>`/`<neighbor>.<arg>` field accesses
/// resolve against it instead of the model.
struct ArgumentBinding {
    group_index: GroupIndex,
    name: String,
    values: Vec<f64>,
}

/// Execution environment for one `run_procedure` call: resolved group
/// aliases, the particle currently bound to each alias (if inside a
/// `foreach`/`foreach_neighbor`), and `let`-bound scalar locals.
struct Env<'a> {
    group_of_alias: HashMap<String, GroupIndex>,
    current_item: HashMap<String, usize>,
    locals: HashMap<String, f64>,
    model: &'a mut Model,
    argument: Option<ArgumentBinding>,
}

impl<'a> Env<'a> {
    fn read_field(&self, alias: &str, field: &str) -> Result<f64, SchemeError> {
        let group_index = *self
            .group_of_alias
            .get(alias)
            .ok_or_else(|| SchemeError::CompileError(format!("unknown alias {alias:?}")))?;
        if let Some(argument) = &self.argument {
            if argument.name == field && argument.group_index == group_index {
                if let Some(item) = self.current_item.get(alias).copied() {
                    return Ok(argument.values[item]);
                }
            }
        }
        let group = self
            .model
            .get_group(group_index)
            .ok_or_else(|| SchemeError::CompileError(format!("group for alias {alias:?} no longer exists")))?;
        if let Some(item) = self.current_item.get(alias).copied() {
            if let Some(data) = group.varying().try_get::<f64, 1>(field) {
                return Ok(data.as_slice()[item][0]);
            }
        }
        if let Some(data) = group.uniform().try_get::<f64, 1>(field) {
            return Ok(data.get()[0]);
        }
        Err(SchemeError::CompileError(format!("unknown field {alias}.{field}")))
    }

    fn write_field(&mut self, alias: &str, field: &str, op: AssignOp, value: f64) -> Result<(), SchemeError> {
        let group_index = *self
            .group_of_alias
            .get(alias)
            .ok_or_else(|| SchemeError::CompileError(format!("unknown alias {alias:?}")))?;
        let item = self.current_item.get(alias).copied();
        let group = self
            .model
            .get_group_mut(group_index)
            .ok_or_else(|| SchemeError::CompileError(format!("group for alias {alias:?} no longer exists")))?;

        if let Some(item) = item {
            if group.varying().try_get::<f64, 1>(field).is_none() {
                group.add_varying::<f64, 1>(field, Shape::scalar()).ok();
            }
            let data = group
                .varying_mut()
                .try_get_mut::<f64, 1>(field)
                .ok_or_else(|| SchemeError::CompileError(format!("unknown field {alias}.{field}")))?;
            let slot = &mut data.as_mut_slice()[item][0];
            *slot = apply_assign(op, *slot, value);
            return Ok(());
        }

        if group.uniform().try_get::<f64, 1>(field).is_none() {
            group.add_uniform::<f64, 1>(field, Shape::scalar()).ok();
        }
        let data = group
            .uniform_mut()
            .try_get_mut::<f64, 1>(field)
            .ok_or_else(|| SchemeError::CompileError(format!("unknown field {alias}.{field}")))?;
        let current = data.get()[0];
        data.set([apply_assign(op, current, value)]);
        Ok(())
    }
}

fn apply_assign(op: AssignOp, current: f64, value: f64) -> f64 {
    match op {
        AssignOp::Set => value,
        AssignOp::Add => current + value,
        AssignOp::Sub => current - value,
        AssignOp::Mul => current * value,
        AssignOp::Div => current / value,
        AssignOp::Max => current.max(value),
        AssignOp::Min => current.min(value),
    }
}

/// Evaluates a `groups` block's `where <selector>` refinement (spec.md §4.5)
/// against a candidate group's type and tags.
fn selector_matches(selector: &Selector, group: &Group) -> bool {
    match selector {
        Selector::Type(type_name) => group.group_type() == type_name,
        Selector::Tag(tag) => group.has_tag(tag),
        Selector::And(lhs, rhs) => selector_matches(lhs, group) && selector_matches(rhs, group),
        Selector::Or(lhs, rhs) => selector_matches(lhs, group) || selector_matches(rhs, group),
        Selector::Not(inner) => !selector_matches(inner, group),
    }
}

/// The accumulation identity for a reduce operator (spec.md §9: "reduction
/// identities"): `+` -> 0, `*` -> 1, `max` -> -inf, `min` -> +inf.
fn reduce_identity(op: ReduceOp) -> f64 {
    match op {
        ReduceOp::Add => 0.0,
        ReduceOp::Mul => 1.0,
        ReduceOp::Max => f64::NEG_INFINITY,
        ReduceOp::Min => f64::INFINITY,
    }
}

fn apply_reduce(op: ReduceOp, current: f64, value: f64) -> f64 {
    match op {
        ReduceOp::Add => current + value,
        ReduceOp::Mul => current * value,
        ReduceOp::Max => current.max(value),
        ReduceOp::Min => current.min(value),
    }
}

fn eval(expr: &Expr, env: &Env) -> Result<f64, SchemeError> {
    Ok(match expr {
        Expr::Number(n, _) => *n,
        Expr::Ident(name, _) => {
            if let Some(&v) = env.locals.get(name) {
                v
            } else if let Some(data) = env.model.global().try_get::<f64, 1>(name) {
                data.get()[0]
            } else {
                return Err(SchemeError::CompileError(format!("unknown identifier {name:?}")));
            }
        }
        Expr::FieldAccess { alias, field, .. } => env.read_field(alias, field)?,
        Expr::Unary { op: BinOp::Sub, operand, .. } => -eval(operand, env)?,
        Expr::Unary { operand, .. } => eval(operand, env)?,
        Expr::Binary { op, lhs, rhs, .. } => {
            let l = eval(lhs, env)?;
            let r = eval(rhs, env)?;
            match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => l / r,
            }
        }
        Expr::Call { name, args, .. } => {
            let a: Result<Vec<f64>, SchemeError> = args.iter().map(|a| eval(a, env)).collect();
            let a = a?;
            match (name.as_str(), a.as_slice()) {
                ("sqrt", [x]) => x.sqrt(),
                ("abs", [x]) => x.abs(),
                ("min", [x, y]) => x.min(*y),
                ("max", [x, y]) => x.max(*y),
                _ => return Err(SchemeError::CompileError(format!("unknown function {name:?}"))),
            }
        }
    })
}

impl CompiledScheme {
    /// Runs `procedure_name` against `model`, using `neighborhood` for any
    /// `foreach_neighbor` loops.
    pub fn run_procedure<const D: usize>(
        &self,
        procedure_name: &str,
        model: &mut Model,
        neighborhood: &GroupedUniformGrid<f64, D>,
    ) -> Result<(), SchemeError> {
        log::debug!("running procedure {procedure_name:?} of scheme {:?}", self.decl.name);
        let procedure = self
            .decl
            .procedures
            .iter()
            .find(|p| p.name == procedure_name)
            .ok_or_else(|| SchemeError::UnknownProcedure(procedure_name.to_string()))?;

        let mut group_of_alias = HashMap::new();
        for group_decl in &self.decl.groups {
            if let Some((index, _)) = model.groups().find(|(_, g)| {
                g.group_type() == group_decl.type_name
                    && group_decl.selector.as_ref().map_or(true, |s| selector_matches(s, g))
            }) {
                group_of_alias.insert(group_decl.alias.clone(), index);
            }
        }

        let mut accumulators: HashMap<String, f64> = HashMap::new();

        let mut env = Env {
            group_of_alias,
            current_item: HashMap::new(),
            locals: HashMap::new(),
            model,
            argument: None,
        };

        run_block(&procedure.body, &mut env, neighborhood, &mut accumulators)?;

        for (name, value) in accumulators {
            if let Some((alias, field)) = name.split_once('.') {
                env.write_field(alias, field, AssignOp::Set, value)?;
            } else if let Some(data) = env.model.global_mut().try_get_mut::<f64, 1>(&name) {
                data.set([value]);
            }
        }
        Ok(())
    }
}

fn run_block<const D: usize>(
    body: &[Stmt],
    env: &mut Env,
    neighborhood: &GroupedUniformGrid<f64, D>,
    accumulators: &mut HashMap<String, f64>,
) -> Result<(), SchemeError> {
    for stmt in body {
        match stmt {
            Stmt::Let { name, expr, .. } => {
                let v = eval(expr, env)?;
                env.locals.insert(name.clone(), v);
            }
            Stmt::Compute { target, op, expr, .. } => {
                let value = eval(expr, env)?;
                match target {
                    Expr::FieldAccess { alias, field, .. } => env.write_field(alias, field, *op, value)?,
                    Expr::Ident(name, _) => {
                        let current = env.locals.get(name).copied().unwrap_or(0.0);
                        env.locals.insert(name.clone(), apply_assign(*op, current, value));
                    }
                    _ => return Err(SchemeError::CompileError("compute target must be a field access or local".into())),
                }
            }
            Stmt::Reduce { target, op, expr, .. } => {
                let value = eval(expr, env)?;
                let name = target_name(target)
                    .ok_or_else(|| SchemeError::CompileError("reduce target must name a field".into()))?;
                let slot = accumulators.entry(name).or_insert_with(|| reduce_identity(*op));
                *slot = apply_reduce(*op, *slot, value);
            }
            Stmt::Foreach { alias, body, .. } => {
                let group_index = *env
                    .group_of_alias
                    .get(alias)
                    .ok_or_else(|| SchemeError::CompileError(format!("unknown alias {alias:?}")))?;
                let count = env
                    .model
                    .get_group(group_index)
                    .map(|g| g.item_count())
                    .unwrap_or(0);
                for item in 0..count {
                    env.current_item.insert(alias.clone(), item);
                    run_block(body, env, neighborhood, accumulators)?;
                }
                env.current_item.remove(alias);
            }
            Stmt::ForeachNeighbor {
                neighbor_alias,
                of_alias,
                body,
                ..
            } => {
                let of_group = *env
                    .group_of_alias
                    .get(of_alias)
                    .ok_or_else(|| SchemeError::CompileError(format!("unknown alias {of_alias:?}")))?;
                let of_item = *env
                    .current_item
                    .get(of_alias)
                    .ok_or_else(|| SchemeError::CompileError(format!("{of_alias} is not bound by an enclosing foreach")))?;
                let neighbor_group = *env
                    .group_of_alias
                    .get(neighbor_alias)
                    .ok_or_else(|| SchemeError::CompileError(format!("unknown alias {neighbor_alias:?}")))?;

                // A typical particle's kernel support holds a couple dozen
                // neighbors, so this stays on the stack (spec.md §4.7
                // Lowering: "keeps a reusable neighbor-list vector per
                // group").
                let mut neighbors: SmallVec<[usize; 32]> = SmallVec::new();
                neighborhood.neighbors_of(
                    ParticleRef {
                        group: of_group,
                        index: of_item,
                    },
                    neighborhood.cell_size(),
                    |other, _dist_sq| {
                        if other.group == neighbor_group {
                            neighbors.push(other.index);
                        }
                    },
                );
                for item in neighbors {
                    env.current_item.insert(neighbor_alias.clone(), item);
                    run_block(body, env, neighborhood, accumulators)?;
                }
                env.current_item.remove(neighbor_alias);
            }
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
            } => solve_block(
                unknown,
                group,
                rhs,
                guess,
                system_arg,
                system,
                precond_arg,
                precond,
                env,
                neighborhood,
                accumulators,
            )?,
        }
    }
    Ok(())
}

/// Runs `body` once per particle of `alias`'s group, reading the block's
/// result out of the `output_name` local it must set (spec.md §4.6).
fn eval_group_block<const D: usize>(
    body: &[Stmt],
    output_name: &str,
    alias: &str,
    count: usize,
    env: &mut Env,
    neighborhood: &GroupedUniformGrid<f64, D>,
    accumulators: &mut HashMap<String, f64>,
) -> Result<Vec<f64>, SchemeError> {
    let mut out = vec![0.0; count];
    for item in 0..count {
        env.current_item.insert(alias.to_string(), item);
        run_block(body, env, neighborhood, accumulators)?;
        out[item] = *env
            .locals
            .get(output_name)
            .ok_or_else(|| SchemeError::CompileError(format!("solve block did not set `{output_name}`")))?;
    }
    env.current_item.remove(alias);
    Ok(out)
}

/// As [`eval_group_block`], but binds `input` as `<alias>.<arg_name>` (and,
/// via [`ArgumentBinding`], `<neighbor_alias>.<arg_name>` inside a nested
/// `foreach_neighbor`) for the duration of the call — the `system`/`precond`
/// operator's input iterate.
fn eval_operator_block<const D: usize>(
    body: &[Stmt],
    output_name: &str,
    arg_name: &str,
    alias: &str,
    group_index: GroupIndex,
    input: &[f64],
    env: &mut Env,
    neighborhood: &GroupedUniformGrid<f64, D>,
    accumulators: &mut HashMap<String, f64>,
) -> Result<Vec<f64>, SchemeError> {
    env.argument = Some(ArgumentBinding {
        group_index,
        name: arg_name.to_string(),
        values: input.to_vec(),
    });
    let mut out = vec![0.0; input.len()];
    for item in 0..input.len() {
        env.current_item.insert(alias.to_string(), item);
        run_block(body, env, neighborhood, accumulators)?;
        out[item] = *env.locals.get(output_name).ok_or_else(|| {
            SchemeError::CompileError(format!("solve operator block did not set `{output_name}`"))
        })?;
    }
    env.current_item.remove(alias);
    env.argument = None;
    Ok(out)
}

/// Lowers a `solve` statement (spec.md §4.6) into a preconditioned
/// conjugate-gradient iteration, reusing the same recurrence as
/// [`crate::pcg::solve`] but driving `rhs`/`guess`/`system`/`precond` as
/// per-particle blocks against `env` rather than as free closures — a
/// `solve` block's `system`/`precond` bodies can nest `foreach_neighbor`,
/// which needs `env`, `neighborhood` and `accumulators` live across calls
/// that `crate::pcg::solve`'s `Fn` closures can't share simultaneously.
#[allow(clippy::too_many_arguments)]
fn solve_block<const D: usize>(
    unknown: &str,
    group: &str,
    rhs: &[Stmt],
    guess: &[Stmt],
    system_arg: &str,
    system: &[Stmt],
    precond_arg: &str,
    precond: &[Stmt],
    env: &mut Env,
    neighborhood: &GroupedUniformGrid<f64, D>,
    accumulators: &mut HashMap<String, f64>,
) -> Result<(), SchemeError> {
    let group_index = *env
        .group_of_alias
        .get(group)
        .ok_or_else(|| SchemeError::CompileError(format!("unknown alias {group:?}")))?;
    let count = env
        .model
        .get_group(group_index)
        .map(|g| g.item_count())
        .unwrap_or(0);
    if count == 0 {
        return Ok(());
    }

    let b = eval_group_block(rhs, "b", group, count, env, neighborhood, accumulators)?;
    let mut x = eval_group_block(guess, "x", group, count, env, neighborhood, accumulators)?;

    let tolerances = crate::pcg::Tolerances::<f64>::default();

    let mut r = eval_operator_block(system, "q", system_arg, group, group_index, &x, env, neighborhood, accumulators)?;
    crate::pcg::par_axpy_inplace(&mut r, -1.0, &b);

    let b_nsq = crate::pcg::par_norm_squared(&b);
    let threshold = (tolerances.tolerance * tolerances.tolerance * b_nsq).max(f64::EPSILON);

    let mut y = eval_operator_block(precond, "y", precond_arg, group, group_index, &r, env, neighborhood, accumulators)?;
    let mut p: Vec<f64> = y.iter().map(|&v| -v).collect();
    let mut prev_r_dot_y = crate::pcg::par_dot(&r, &y);

    let mut k = 0usize;
    let mut r_nsq = crate::pcg::par_norm_squared(&r);
    while !crate::pcg::converged(k, r_nsq, threshold, tolerances.min_iterations, tolerances.max_iterations) {
        let q = eval_operator_block(system, "q", system_arg, group, group_index, &p, env, neighborhood, accumulators)?;
        let p_dot_q = crate::pcg::par_dot(&p, &q);
        if p_dot_q.abs() < tolerances.tolerance {
            break;
        }
        let alpha = prev_r_dot_y / p_dot_q;
        crate::pcg::par_axpy_inplace(&mut x, alpha, &p);
        crate::pcg::par_axpy_inplace(&mut r, alpha, &q);
        r_nsq = crate::pcg::par_norm_squared(&r);

        y = eval_operator_block(precond, "y", precond_arg, group, group_index, &r, env, neighborhood, accumulators)?;
        let next_r_dot_y = crate::pcg::par_dot(&r, &y);
        if prev_r_dot_y.abs() < tolerances.tolerance {
            break;
        }
        let beta = next_r_dot_y / prev_r_dot_y;
        for i in 0..count {
            p[i] = -y[i] + beta * p[i];
        }
        prev_r_dot_y = next_r_dot_y;
        k += 1;
    }

    for item in 0..count {
        env.current_item.insert(group.to_string(), item);
        env.write_field(group, unknown, AssignOp::Set, x[item])?;
    }
    env.current_item.remove(group);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::shape::Shape;
    use crate::dsl::parser::parse_program;

    #[test]
    fn no_op_scheme_with_global_field_runs() {
        let source = r#"
            scheme gravity {
                global {
                    field g = real g;
                }
                groups fluid : particle {
                    varying field v = real v;
                }
                procedure apply {
                    foreach fluid {
                        compute fluid.v += g;
                    }
                }
            }
        "#;
        let program = parse_program(source).unwrap();
        let compiled = &compile(&program).unwrap()[0];

        let mut model = Model::new();
        model.add_global::<f64, 1>("g", Shape::scalar()).unwrap();
        model.global_mut().try_get_mut::<f64, 1>("g").unwrap().set([-9.81]);
        let group = model.add_group("fluid", "particle").unwrap();
        model
            .get_group_mut(group)
            .unwrap()
            .add_varying::<f64, 1>("v", Shape::scalar())
            .unwrap();
        model.get_group_mut(group).unwrap().create(3);

        let grid = GroupedUniformGrid::<f64, 3>::new(1.0);
        compiled.run_procedure("apply", &mut model, &grid).unwrap();

        let v = model
            .get_group(group)
            .unwrap()
            .varying()
            .try_get::<f64, 1>("v")
            .unwrap();
        for value in v.as_slice() {
            assert!((value[0] - (-9.81)).abs() < 1e-12);
        }
    }

    #[test]
    fn reduction_over_a_thousand_particles() {
        let source = r#"
            scheme counter {
                groups fluid : particle {
                    varying field mass = real mass;
                }
                procedure total_mass {
                    foreach fluid {
                        reduce total_mass_out += fluid.mass;
                    }
                }
            }
        "#;
        let program = parse_program(source).unwrap();
        let compiled = &compile(&program).unwrap()[0];

        let mut model = Model::new();
        let group = model.add_group("fluid", "particle").unwrap();
        model
            .get_group_mut(group)
            .unwrap()
            .add_varying::<f64, 1>("mass", Shape::scalar())
            .unwrap();
        model.get_group_mut(group).unwrap().create(1000);
        {
            let g = model.get_group_mut(group).unwrap();
            let field = g.varying_mut().try_get_mut::<f64, 1>("mass").unwrap();
            for v in field.as_mut_slice() {
                v[0] = 2.0;
            }
        }
        model.add_global::<f64, 1>("total_mass_out", Shape::scalar()).unwrap();

        let grid = GroupedUniformGrid::<f64, 3>::new(1.0);
        compiled.run_procedure("total_mass", &mut model, &grid).unwrap();

        let total = model
            .global()
            .try_get::<f64, 1>("total_mass_out")
            .unwrap()
            .get()[0];
        assert!((total - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_duplicate_aliases() {
        let source = r#"
            scheme bad {
                groups a : particle {}
                groups a : particle {}
                procedure p {}
            }
        "#;
        let program = parse_program(source).unwrap();
        let err = compile(&program).unwrap_err();
        assert!(matches!(err, SchemeError::CompileError(_)));
    }

    /// Drives the 2x2 SPD system `[[2,1],[1,2]] x = [1,2]` through a real
    /// `.prtcl` solve block: two mutually-visible particles, `system`
    /// computed as `2*p + sum_of_neighbor_p` via a nested
    /// `foreach_neighbor`. Exact solution is `x = [0, 1]`.
    #[test]
    fn solve_block_runs_a_neighbor_coupled_pcg_system() {
        let source = r#"
            scheme pressure_solve {
                groups fluid : particle {
                    varying field pressure = real pressure;
                    varying field rhs_value = real rhs_value;
                }
                groups other : particle {}
                procedure solve_pressure {
                    solve pressure over fluid {
                        rhs {
                            let b = fluid.rhs_value;
                        }
                        guess {
                            let x = 0;
                        }
                        system(p) {
                            let q = 2 * fluid.p;
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
        let program = parse_program(source).unwrap();
        let compiled = &compile(&program).unwrap()[0];

        let mut model = Model::new();
        let group = model.add_group("fluid", "particle").unwrap();
        model
            .get_group_mut(group)
            .unwrap()
            .add_varying::<f64, 1>("pressure", Shape::scalar())
            .unwrap();
        model
            .get_group_mut(group)
            .unwrap()
            .add_varying::<f64, 1>("rhs_value", Shape::scalar())
            .unwrap();
        model.get_group_mut(group).unwrap().create(2);
        model
            .get_group_mut(group)
            .unwrap()
            .varying_mut()
            .try_get_mut::<f64, 1>("rhs_value")
            .unwrap()
            .as_mut_slice()
            .copy_from_slice(&[[1.0], [2.0]]);

        let mut grid = GroupedUniformGrid::<f64, 3>::new(1.0);
        grid.update(vec![
            (ParticleRef { group, index: 0 }, [0.0, 0.0, 0.0]),
            (ParticleRef { group, index: 1 }, [0.1, 0.0, 0.0]),
        ]);

        compiled.run_procedure("solve_pressure", &mut model, &grid).unwrap();

        let pressure = model
            .get_group(group)
            .unwrap()
            .varying()
            .try_get::<f64, 1>("pressure")
            .unwrap();
        assert!((pressure.as_slice()[0][0] - 0.0).abs() < 1e-4);
        assert!((pressure.as_slice()[1][0] - 1.0).abs() < 1e-4);
    }
}
