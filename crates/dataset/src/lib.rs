//! The dataset: the registry of adapters, views, functions, aggregates and
//! syntax packs a query runs against, plus the query façade itself.

mod adapter;
mod builtins;
mod query;
#[cfg(test)]
mod tests;

pub use adapter::{Adapter, MemoryAdapter, Table};
pub use query::{LogicalCost, Query};

use common::{EngineError, EngineResult, EvalContext, Row, Rows};
use expr::{Expr, Relation};
use hashbrown::HashMap;
use planner::{resolve_schema, RelationProvider};
use schema::Schema;
use std::rc::Rc;
use std::sync::Arc;
use syntax::{
    Aggregate, FunctionProvider, ScalarUdf, SyntaxPack, SyntaxRegistry, TableFn,
};

/// A function found by name in a dataset, whatever its kind.
pub enum NamedFunction<'a> {
    Scalar(&'a ScalarUdf),
    Aggregate(&'a Aggregate),
    Table(&'a TableFn),
}

/// A dataset scopes everything a query needs: adapters serving relations,
/// stored views, user functions and aggregates, and the syntax registry of
/// installed extension packs. Registration happens outside query execution;
/// queries only read.
pub struct DataSet {
    name: String,
    adapters: Vec<Arc<dyn Adapter>>,
    views: HashMap<String, Expr>,
    udfs: HashMap<String, ScalarUdf>,
    table_fns: HashMap<String, TableFn>,
    aggregates: HashMap<String, Aggregate>,
    registry: SyntaxRegistry,
}

impl DataSet {
    /// A dataset pre-populated with the standard aggregates and the math
    /// and string scalar functions.
    pub fn new(name: impl Into<String>) -> Self {
        let mut dataset = Self {
            name: name.into(),
            adapters: Vec::new(),
            views: HashMap::new(),
            udfs: HashMap::new(),
            table_fns: HashMap::new(),
            aggregates: HashMap::new(),
            registry: SyntaxRegistry::new(),
        };
        builtins::register_on(&mut dataset);
        dataset
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &SyntaxRegistry {
        &self.registry
    }

    /// Install a syntax pack into this dataset's registry.
    pub fn install_pack(&mut self, pack: &dyn SyntaxPack) -> EngineResult<()> {
        self.registry.install(pack)
    }

    pub fn uninstall_pack(&mut self, name: &str) {
        self.registry.uninstall(name);
    }

    /// Add an adapter; repeated adds of the same adapter name are ignored.
    pub fn add_adapter(&mut self, adapter: Arc<dyn Adapter>) {
        if !self.adapters.iter().any(|a| a.name() == adapter.name()) {
            self.adapters.push(adapter);
        }
    }

    pub fn remove_adapter(&mut self, name: &str) {
        self.adapters.retain(|a| a.name() != name);
    }

    /// All relations served by all adapters, in adapter order.
    pub fn relations(&self) -> Vec<(String, Schema)> {
        self.adapters
            .iter()
            .flat_map(|a| a.relations())
            .collect()
    }

    /// Store a view under `name`: the statement is parsed and resolved now,
    /// and `Load(name)` expands to the stored plan from then on.
    pub fn create_view(&mut self, name: impl Into<String>, sql: &str) -> EngineResult<()> {
        let query = self.query(sql)?;
        let plan = query.plan().clone();
        self.create_view_from_plan(name, plan)
    }

    pub fn create_view_from_plan(
        &mut self,
        name: impl Into<String>,
        plan: Expr,
    ) -> EngineResult<()> {
        let name = name.into();
        let plan = if plan.is_resolved() {
            plan
        } else {
            resolve_schema(&plan, self, self, &self.registry)?
        };
        let schema = plan
            .schema()
            .cloned()
            .ok_or_else(|| {
                EngineError::PlannerInternal("a view needs a relational plan".into())
            })?
            .aliased(name.clone());
        self.views.insert(
            name.clone(),
            Expr::Alias {
                name,
                input: Box::new(plan),
                schema: Some(schema),
            },
        );
        Ok(())
    }

    pub fn get_view(&self, name: &str) -> Option<&Expr> {
        self.views.get(name)
    }

    /// Register a scalar function. A function and an aggregate may not
    /// share a name.
    pub fn add_function(&mut self, udf: ScalarUdf) -> EngineResult<()> {
        if self.aggregates.contains_key(&udf.name) {
            return Err(EngineError::NameConflict(format!(
                "'{}' is already registered as an aggregate",
                udf.name
            )));
        }
        self.udfs.insert(udf.name.clone(), udf);
        Ok(())
    }

    /// Register a relational table function under the same namespace.
    pub fn add_table_function(&mut self, table_fn: TableFn) -> EngineResult<()> {
        if self.aggregates.contains_key(&table_fn.name) {
            return Err(EngineError::NameConflict(format!(
                "'{}' is already registered as an aggregate",
                table_fn.name
            )));
        }
        self.table_fns.insert(table_fn.name.clone(), table_fn);
        Ok(())
    }

    pub fn add_aggregate(&mut self, aggregate: Aggregate) -> EngineResult<()> {
        if self.udfs.contains_key(&aggregate.name) || self.table_fns.contains_key(&aggregate.name)
        {
            return Err(EngineError::NameConflict(format!(
                "'{}' is already registered as a function",
                aggregate.name
            )));
        }
        self.aggregates.insert(aggregate.name.clone(), aggregate);
        Ok(())
    }

    /// Uniform lookup over every registered function namespace.
    pub fn get_function(&self, name: &str) -> Option<NamedFunction<'_>> {
        if let Some(udf) = self.udfs.get(name) {
            return Some(NamedFunction::Scalar(udf));
        }
        if let Some(aggregate) = self.aggregates.get(name) {
            return Some(NamedFunction::Aggregate(aggregate));
        }
        self.table_fns.get(name).map(NamedFunction::Table)
    }

    /// Schema of a named relation or view.
    pub fn get_schema(&self, name: &str) -> EngineResult<Schema> {
        let resolved = resolve_schema(&Expr::load(name), self, self, &self.registry)?;
        resolved
            .schema()
            .cloned()
            .ok_or_else(|| EngineError::RelationNotFound(name.to_string()))
    }

    /// Parse and resolve a statement into a ready query.
    pub fn query(&self, sql: &str) -> EngineResult<Query<'_>> {
        let plan = parser::parse_statement(sql, &self.registry)?;
        Query::new(self, plan, true, None)
    }

    /// Execute a query with positional parameters, collecting all rows.
    pub fn execute(&self, query: &Query<'_>, params: Vec<types::Value>) -> EngineResult<Vec<Row>> {
        let ctx = Rc::new(EvalContext::new(params));
        self.execute_with_ctx(query, &ctx)
    }

    /// Execute against a caller-supplied context (the cost model reads the
    /// statistics back out of it).
    pub fn execute_with_ctx(
        &self,
        query: &Query<'_>,
        ctx: &Rc<EvalContext>,
    ) -> EngineResult<Vec<Row>> {
        let compiler = executor::Compiler::new(self, &self.registry);
        compiler.run(query.plan(), ctx)
    }
}

impl RelationProvider for DataSet {
    fn view(&self, name: &str) -> Option<Expr> {
        self.views.get(name).cloned()
    }

    fn bind_relation(&self, name: &str) -> EngineResult<Option<Relation>> {
        if name.is_empty() {
            // a FROM-less statement projects over one empty row
            return Ok(Some(Relation::new(
                "",
                "",
                Schema::new(Vec::new()),
                Arc::new(|_ctx| -> EngineResult<Rows> {
                    Ok(executor::rows_from_vec(vec![Row::new(Vec::new())]))
                }),
            )));
        }
        for adapter in &self.adapters {
            if adapter.has(name) {
                let schema = adapter.schema(name)?;
                let owner = Arc::clone(adapter);
                let relation = name.to_string();
                return Ok(Some(Relation::new(
                    adapter.name(),
                    name,
                    schema,
                    Arc::new(move |ctx| owner.scan(&relation, ctx)),
                )));
            }
        }
        Ok(None)
    }
}

impl FunctionProvider for DataSet {
    fn scalar_udf(&self, name: &str) -> Option<&ScalarUdf> {
        self.udfs.get(name)
    }

    fn aggregate(&self, name: &str) -> Option<&Aggregate> {
        self.aggregates.get(name)
    }

    fn table_fn(&self, name: &str) -> Option<&TableFn> {
        self.table_fns.get(name)
    }
}
