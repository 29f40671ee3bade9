//! Process-wide caches of schemas and plans for static record types.
//!
//! Each key maps to its own `OnceCell`. The cell is cloned out of the map
//! before it is initialized, so building one entry never holds a map shard
//! while it builds the nested entries it depends on.

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};

use crate::error::SchemaError;
use crate::plan::{DecodePlan, Target};
use crate::record::Record;
use crate::schema::{RecordSchema, SchemaBuilder, TypeRef};

type SchemaCell = Arc<OnceCell<Result<Arc<RecordSchema>, SchemaError>>>;
type PlanCell = Arc<OnceCell<Arc<DecodePlan>>>;

static SCHEMAS: Lazy<DashMap<TypeId, SchemaCell>> = Lazy::new(DashMap::new);
static PLANS: Lazy<DashMap<(TypeId, Target), PlanCell>> = Lazy::new(DashMap::new);

fn cell<K, V>(map: &DashMap<K, Arc<OnceCell<V>>>, key: K) -> Arc<OnceCell<V>>
where
    K: Eq + std::hash::Hash,
{
    map.entry(key).or_default().clone()
}

/// The schema of `T`, built on first use.
///
/// A failed build is cached and returned to every later caller.
pub fn schema<T: Record>() -> Result<Arc<RecordSchema>, SchemaError> {
    cell(&SCHEMAS, TypeId::of::<T>())
        .get_or_init(build_schema::<T>)
        .clone()
}

fn build_schema<T: Record>() -> Result<Arc<RecordSchema>, SchemaError> {
    check_cycles(TypeRef::of::<T>()).map_err(|err| {
        log::warn!("rejecting record {}: {}", T::record_name(), err);
        err
    })?;

    let mut builder = SchemaBuilder::for_type::<T>();
    T::declare(&mut builder);
    builder.build().map(Arc::new)
}

/// The compiled plan of `T` for `target`, compiled on first use.
pub fn plan<T: Record>(target: Target) -> Result<Arc<DecodePlan>, SchemaError> {
    let schema = schema::<T>()?;
    Ok(plan_for(&schema, target))
}

/// Build the schema and both plans of `T` now, so that a bad declaration
/// fails at startup instead of on the first event.
pub fn register<T: Record>() -> Result<(), SchemaError> {
    plan::<T>(Target::TypedInstance)?;
    plan::<T>(Target::OrderedMapping)?;
    log::debug!("registered record {}", T::record_name());
    Ok(())
}

/// The plan of `schema` for `target`.
///
/// Schemas of static types share one cached plan per target; explicitly
/// built schemas are compiled on every call.
pub(crate) fn plan_for(schema: &Arc<RecordSchema>, target: Target) -> Arc<DecodePlan> {
    match schema.type_id() {
        Some(id) => cell(&PLANS, (id, target))
            .get_or_init(|| Arc::new(DecodePlan::compile(schema, target)))
            .clone(),
        None => Arc::new(DecodePlan::compile(schema, target)),
    }
}

/// Walk the nested record types reachable from `root` using only their
/// declarations and fail if any of them contains itself.
fn check_cycles(root: TypeRef) -> Result<(), SchemaError> {
    let mut path = Vec::new();
    let mut done = HashSet::new();
    visit(root, &mut path, &mut done)
}

fn visit(
    node: TypeRef,
    path: &mut Vec<TypeRef>,
    done: &mut HashSet<TypeId>,
) -> Result<(), SchemaError> {
    if done.contains(&node.id) || is_built(node.id) {
        return Ok(());
    }
    if let Some(start) = path.iter().position(|r| r.id == node.id) {
        let mut names: Vec<String> = path[start..].iter().map(|r| r.name().to_string()).collect();
        names.push(node.name().to_string());
        return Err(SchemaError::Cycle { path: names });
    }

    let mut builder = SchemaBuilder::new(node.name());
    (node.declare)(&mut builder);

    path.push(node);
    for child in builder.type_refs() {
        visit(*child, path, done)?;
    }
    path.pop();
    done.insert(node.id);
    Ok(())
}

/// A successfully built schema proves its whole subtree acyclic.
fn is_built(id: TypeId) -> bool {
    SCHEMAS
        .get(&id)
        .is_some_and(|cell| matches!(cell.get(), Some(Ok(_))))
}
