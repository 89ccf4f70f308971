//! Level-by-level DAG scheduling.
//!
//! The scheduler walks a recipe's dependency graph one level at a time.
//! Every step in a level that passes its gate (dependencies succeeded,
//! condition true) is dispatched to a bounded worker pool; the level
//! completes as a barrier before the next one is computed, so level N+1
//! readiness always sees level N's final statuses. A failure never aborts
//! in-flight siblings, and branches independent of a failure keep running.
//!
//! The scheduler is stateless between calls: every run is parameterized by
//! a recipe and a context, which is what lets sub-recipe composition
//! re-enter it recursively.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rayon::ThreadPoolBuilder;
use serde_json::json;
use tracing::{debug, warn};

use crate::capability::CapabilityRegistry;
use crate::context::ContextStore;
use crate::error::{EngineError, Result};
use crate::expr::StaticScope;
use crate::graph::DependencyGraph;
use crate::recipe::{fingerprint, Recipe, RecipeLibrary, StepKind};

use super::compose;
use super::executor::{self, StepOutcome};
use super::node::{ExecutionNode, NodeStatus};
use super::options::RunOptions;
use super::prepared::PreparedStep;
use super::report::{RunReport, RunStatus};

/// Run lifecycle, in order. Used for trace logging and final status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Initialized,
    Running,
    Completed,
    Failed,
}

/// What the gate decided for one ready step.
enum Gate {
    /// Dispatch to a worker.
    Dispatch,
    /// Mark skipped without dispatch.
    Skip(String),
    /// Mark failed without dispatch (condition evaluation error).
    Fail(String),
}

/// Dependency-graph scheduler over a bounded worker pool.
#[derive(Debug)]
pub struct Scheduler {
    registry: Arc<CapabilityRegistry>,
    library: Arc<RecipeLibrary>,
}

impl Scheduler {
    /// Create a scheduler over a capability registry and recipe library.
    pub fn new(registry: Arc<CapabilityRegistry>, library: Arc<RecipeLibrary>) -> Self {
        Self { registry, library }
    }

    /// The recipe library sub-recipe references resolve against.
    pub fn library(&self) -> &Arc<RecipeLibrary> {
        &self.library
    }

    /// The capability registry steps dispatch through.
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Run a recipe registered in the library.
    pub fn run_named(
        &self,
        name: &str,
        context: Arc<ContextStore>,
        options: &RunOptions,
    ) -> Result<RunReport> {
        let recipe = self.library.get(name)?;
        self.run(&recipe, context, options)
    }

    /// Run a recipe to completion.
    ///
    /// Build-time failures (graph errors, condition parse errors, missing
    /// required parameters) return `Err` before any step executes. Once
    /// dispatch begins, step failures are captured into the report and the
    /// run always produces `Ok`.
    pub fn run(
        &self,
        recipe: &Recipe,
        context: Arc<ContextStore>,
        options: &RunOptions,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let mut state = RunState::Initialized;
        debug!(recipe = %recipe.name, "run state: {:?}", state);

        // Build phase: everything that can fail before dispatch.
        let graph = DependencyGraph::from_recipe(recipe)?;
        let prepared = PreparedStep::prepare_all(recipe)?;
        let prepared: HashMap<String, PreparedStep> = prepared
            .into_iter()
            .map(|p| (p.spec.name.clone(), p))
            .collect();
        let fingerprint = fingerprint::fingerprint(recipe)?;
        let scope = build_scope(recipe, options)?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(options.effective_workers())
            .build()
            .map_err(|e| EngineError::Other(e.into()))?;

        // Parameters are also visible through the context, namespaced.
        for (name, value) in scope.iter() {
            context.set(format!("params.{}", name), value.clone(), &options.who);
        }

        let mut nodes: HashMap<String, ExecutionNode> = recipe
            .steps
            .iter()
            .map(|s| (s.name.clone(), ExecutionNode::new(&s.name, s.index)))
            .collect();

        state = RunState::Running;
        debug!(
            recipe = %recipe.name,
            workers = options.effective_workers(),
            steps = nodes.len(),
            "run state: {:?}",
            state
        );

        let mut cancelled = false;
        for level in graph.levels() {
            if options.cancel.is_cancelled() {
                warn!(recipe = %recipe.name, "cancellation requested, stopping dispatch");
                cancelled = true;
                break;
            }
            self.run_level(&level, &prepared, &mut nodes, &context, &scope, options, &pool);
        }

        // Terminal level: error-triggered steps fire only when the DAG
        // finished with at least one failure and the run was not cancelled.
        let dag_failed = nodes
            .values()
            .any(|n| n.status == NodeStatus::Failed);
        if dag_failed && !cancelled {
            let handlers: Vec<String> =
                recipe.on_error_steps().map(|s| s.name.clone()).collect();
            if !handlers.is_empty() {
                debug!(recipe = %recipe.name, handlers = handlers.len(), "dispatching on_error steps");
                self.run_level(&handlers, &prepared, &mut nodes, &context, &scope, options, &pool);
            }
        }

        let any_failed = nodes.values().any(|n| n.status == NodeStatus::Failed);
        state = if cancelled || any_failed {
            RunState::Failed
        } else {
            RunState::Completed
        };
        debug!(recipe = %recipe.name, "run state: {:?}", state);

        let mut steps: Vec<ExecutionNode> = nodes.into_values().collect();
        steps.sort_by_key(|n| n.index);

        Ok(RunReport {
            recipe: recipe.name.clone(),
            version: recipe.version.clone(),
            fingerprint,
            status: match state {
                RunState::Completed => RunStatus::Completed,
                _ => RunStatus::Failed,
            },
            cancelled,
            steps,
            duration_ms: start.elapsed().as_millis() as u64,
            context: context.snapshot(),
            history_len: context.history_len(),
        })
    }

    /// Gate, dispatch, and settle one level. Blocks until every dispatched
    /// step in the level reaches a terminal status.
    #[allow(clippy::too_many_arguments)]
    fn run_level(
        &self,
        names: &[String],
        prepared: &HashMap<String, PreparedStep>,
        nodes: &mut HashMap<String, ExecutionNode>,
        context: &Arc<ContextStore>,
        scope: &StaticScope,
        options: &RunOptions,
        pool: &rayon::ThreadPool,
    ) {
        // Decide first, mutate second: gating reads sibling statuses.
        let decisions: Vec<(String, Gate)> = names
            .iter()
            .map(|name| {
                let step = prepared
                    .get(name)
                    .expect("level names come from the same recipe");
                (name.clone(), gate_step(step, nodes, scope, context))
            })
            .collect();

        let mut dispatch: Vec<&PreparedStep> = Vec::new();
        for (name, gate) in decisions {
            let node = nodes.get_mut(&name).expect("node exists for every step");
            match gate {
                Gate::Dispatch => {
                    node.status = NodeStatus::Ready;
                    dispatch.push(prepared.get(&name).expect("prepared step exists"));
                }
                Gate::Skip(reason) => {
                    debug!(step = %name, reason = %reason, "skipping step");
                    node.mark_skipped(reason);
                }
                Gate::Fail(message) => {
                    context.set(format!("{}.error", name), json!(message), name.as_str());
                    node.mark_failed(message);
                }
            }
        }

        if dispatch.is_empty() {
            return;
        }

        for step in &dispatch {
            if let Some(node) = nodes.get_mut(&step.spec.name) {
                node.status = NodeStatus::Running;
            }
        }

        let outcomes: Mutex<Vec<StepOutcome>> = Mutex::new(Vec::with_capacity(dispatch.len()));
        pool.scope(|s| {
            for step in &dispatch {
                let context = Arc::clone(context);
                let outcomes = &outcomes;
                s.spawn(move |_| {
                    let outcome = match step.spec.kind() {
                        StepKind::Capability => executor::execute(
                            step,
                            &context,
                            scope,
                            &self.registry,
                            &options.cancel,
                        ),
                        StepKind::SubRecipe => {
                            compose::invoke(self, step, &context, scope, options)
                        }
                    };
                    outcomes.lock().expect("outcome lock poisoned").push(outcome);
                });
            }
        });

        for outcome in outcomes.into_inner().expect("outcome lock poisoned") {
            let node = nodes
                .get_mut(&outcome.step)
                .expect("outcome belongs to a dispatched step");
            node.status = if outcome.success {
                NodeStatus::Succeeded
            } else {
                NodeStatus::Failed
            };
            node.result = outcome.result;
            node.error = outcome.error;
            node.attempts = outcome.attempts;
            node.started_at = Some(outcome.started_at);
            node.finished_at = Some(outcome.finished_at);
        }
    }
}

/// Decide whether a ready step dispatches, skips, or fails.
///
/// Any failed dependency skips the dependent. A skipped dependency also
/// propagates skip, unless the step's own condition independently
/// re-admits it (the policy for fan-in over partially skipped branches).
/// Condition evaluation failures are step failures, not skips.
fn gate_step(
    step: &PreparedStep,
    nodes: &HashMap<String, ExecutionNode>,
    scope: &StaticScope,
    context: &ContextStore,
) -> Gate {
    let status_of = |name: &String| nodes.get(name).map(|n| n.status);

    if let Some(dep) = step
        .spec
        .depends_on
        .iter()
        .find(|d| status_of(d) == Some(NodeStatus::Failed))
    {
        return Gate::Skip(format!("dependency failed: {}", dep));
    }

    let skipped_dep = step
        .spec
        .depends_on
        .iter()
        .find(|d| status_of(d) == Some(NodeStatus::Skipped));

    match (&step.condition, skipped_dep) {
        (None, Some(dep)) => Gate::Skip(format!("dependency skipped: {}", dep)),
        (None, None) => Gate::Dispatch,
        (Some(condition), _) => match condition.evaluate(scope, context) {
            Ok(true) => Gate::Dispatch,
            Ok(false) => Gate::Skip("condition false".to_string()),
            Err(e) => Gate::Fail(e.to_string()),
        },
    }
}

/// Build the static scope: caller bindings plus declared defaults, with
/// required parameters enforced before anything runs.
fn build_scope(recipe: &Recipe, options: &RunOptions) -> Result<StaticScope> {
    let mut scope = StaticScope::new();
    for (name, value) in &options.params {
        scope.bind(name.clone(), value.clone());
    }
    for param in &recipe.params {
        if scope.get(&param.name).is_some() {
            continue;
        }
        if let Some(default) = &param.default {
            scope.bind(param.name.clone(), default.clone());
        } else if param.required {
            return Err(EngineError::RecipeValidation {
                message: format!(
                    "missing required parameter '{}' for recipe '{}'",
                    param.name, recipe.name
                ),
            });
        }
    }
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityCall;
    use crate::recipe::loader;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scheduler() -> Scheduler {
        Scheduler::new(
            Arc::new(CapabilityRegistry::with_builtins()),
            Arc::new(RecipeLibrary::new()),
        )
    }

    fn run_yaml(yaml: &str) -> RunReport {
        run_yaml_with(yaml, RunOptions::default().with_workers(4))
    }

    fn run_yaml_with(yaml: &str, options: RunOptions) -> RunReport {
        let recipe = loader::from_str(yaml).unwrap();
        scheduler()
            .run(&recipe, Arc::new(ContextStore::new()), &options)
            .unwrap()
    }

    #[test]
    fn empty_recipe_completes() {
        let report = run_yaml("name: empty\nsteps: []\n");
        assert!(report.succeeded());
        assert!(report.steps.is_empty());
    }

    #[test]
    fn single_step_runs_and_records_result() {
        let report = run_yaml(
            r#"
name: single
steps:
  - name: greet
    capability: core.echo
    args:
      message: hi
"#,
        );
        assert!(report.succeeded());
        let node = report.step("greet").unwrap();
        assert_eq!(node.status, NodeStatus::Succeeded);
        assert_eq!(node.result, Some(json!("hi")));
        assert_eq!(report.context.get("greet.result"), Some(&json!("hi")));
    }

    #[test]
    fn cyclic_recipe_aborts_before_any_step() {
        let recipe = loader::from_str(
            r#"
name: cyclic
steps:
  - name: a
    capability: core.echo
    depends_on: [b]
    args: {message: a}
  - name: b
    capability: core.echo
    depends_on: [a]
    args: {message: b}
"#,
        )
        .unwrap();

        let context = Arc::new(ContextStore::new());
        let err = scheduler()
            .run(&recipe, Arc::clone(&context), &RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::CyclicDependency { .. }));
        // Build aborts mean no partial execution, so no context writes.
        assert_eq!(context.history_len(), 0);
    }

    #[test]
    fn unknown_dependency_aborts_before_any_step() {
        let recipe = loader::from_str(
            r#"
name: dangling
steps:
  - name: a
    capability: core.echo
    depends_on: [ghost]
    args: {message: a}
"#,
        )
        .unwrap();

        let err = scheduler()
            .run(&recipe, Arc::new(ContextStore::new()), &RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownDependency { .. }));
    }

    #[test]
    fn dependency_order_is_respected() {
        let registry = Arc::new(CapabilityRegistry::new());
        let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        registry.register("record", move |call: CapabilityCall| {
            seen.lock().unwrap().push(call.step.clone());
            Ok(Value::Null)
        });

        let recipe = loader::from_str(
            r#"
name: ordered
steps:
  - name: last
    capability: record
    depends_on: [middle]
  - name: middle
    capability: record
    depends_on: [first]
  - name: first
    capability: record
"#,
        )
        .unwrap();

        let report = Scheduler::new(registry, Arc::new(RecipeLibrary::new()))
            .run(&recipe, Arc::new(ContextStore::new()), &RunOptions::default())
            .unwrap();

        assert!(report.succeeded());
        let visited = order.lock().unwrap().clone();
        assert_eq!(visited, vec!["first", "middle", "last"]);
    }

    #[test]
    fn each_step_runs_exactly_once() {
        let registry = Arc::new(CapabilityRegistry::new());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        registry.register("count", move |_call: CapabilityCall| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });

        let recipe = loader::from_str(
            r#"
name: diamond
steps:
  - name: a
    capability: count
  - name: b
    capability: count
    depends_on: [a]
  - name: c
    capability: count
    depends_on: [a]
  - name: d
    capability: count
    depends_on: [b, c]
"#,
        )
        .unwrap();

        let report = Scheduler::new(registry, Arc::new(RecipeLibrary::new()))
            .run(&recipe, Arc::new(ContextStore::new()), &RunOptions::default())
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn false_condition_skips_without_dispatch() {
        let report = run_yaml(
            r#"
name: gated
steps:
  - name: configure
    capability: core.set
    args:
      mode: quiet
  - name: announce
    capability: core.echo
    depends_on: [configure]
    condition: "${mode} == 'loud'"
    args:
      message: should not run
"#,
        );

        assert!(report.succeeded());
        assert_eq!(report.step_status("announce"), Some(NodeStatus::Skipped));
        assert!(!report.context.contains_key("announce.result"));
    }

    #[test]
    fn skip_propagates_to_dependents() {
        let report = run_yaml(
            r#"
name: chain
steps:
  - name: gate
    capability: core.echo
    condition: "false"
    args: {message: never}
  - name: downstream
    capability: core.echo
    depends_on: [gate]
    args: {message: also never}
"#,
        );

        assert!(report.succeeded());
        assert_eq!(report.step_status("gate"), Some(NodeStatus::Skipped));
        assert_eq!(report.step_status("downstream"), Some(NodeStatus::Skipped));
        assert!(report
            .step("downstream")
            .unwrap()
            .skip_reason
            .as_deref()
            .unwrap()
            .contains("gate"));
    }

    #[test]
    fn own_condition_readmits_past_skipped_dependency() {
        let report = run_yaml(
            r#"
name: readmit
steps:
  - name: gate
    capability: core.echo
    condition: "false"
    args: {message: never}
  - name: anyway
    capability: core.echo
    depends_on: [gate]
    condition: "true"
    args: {message: ran anyway}
"#,
        );

        assert!(report.succeeded());
        assert_eq!(report.step_status("anyway"), Some(NodeStatus::Succeeded));
    }

    #[test]
    fn condition_evaluation_error_fails_the_step() {
        let report = run_yaml(
            r#"
name: bad-condition
steps:
  - name: gated
    capability: core.echo
    condition: "${nowhere} == 1"
    args: {message: hm}
"#,
        );

        assert!(!report.succeeded());
        let node = report.step("gated").unwrap();
        assert_eq!(node.status, NodeStatus::Failed);
        assert!(node.error.as_deref().unwrap().contains("nowhere"));
        assert!(report.context.contains_key("gated.error"));
    }

    #[test]
    fn failed_dependency_skips_dependents_but_not_independents() {
        let report = run_yaml(
            r#"
name: isolation
steps:
  - name: broken
    capability: core.fail
  - name: dependent
    capability: core.echo
    depends_on: [broken]
    args: {message: never}
  - name: independent
    capability: core.echo
    args: {message: fine}
"#,
        );

        assert!(!report.succeeded());
        assert_eq!(report.step_status("broken"), Some(NodeStatus::Failed));
        assert_eq!(report.step_status("dependent"), Some(NodeStatus::Skipped));
        assert_eq!(
            report.step_status("independent"),
            Some(NodeStatus::Succeeded)
        );
    }

    #[test]
    fn failing_sibling_does_not_abandon_level_mates() {
        let report = run_yaml(
            r#"
name: siblings
steps:
  - name: doomed
    capability: core.fail
  - name: steady
    capability: core.sleep
    args:
      duration_ms: 50
"#,
        );

        assert!(!report.succeeded());
        assert_eq!(report.step_status("doomed"), Some(NodeStatus::Failed));
        assert_eq!(report.step_status("steady"), Some(NodeStatus::Succeeded));
    }

    #[test]
    fn on_error_steps_fire_after_failure() {
        let report = run_yaml(
            r#"
name: with-handler
steps:
  - name: work
    capability: core.fail
    args: {message: exploded}
  - name: notify
    capability: core.echo
    trigger: on_error
    args:
      message: "failure handled"
"#,
        );

        assert!(!report.succeeded());
        assert_eq!(report.step_status("notify"), Some(NodeStatus::Succeeded));
        assert_eq!(
            report.context.get("notify.result"),
            Some(&json!("failure handled"))
        );
    }

    #[test]
    fn on_error_steps_do_not_fire_on_success() {
        let report = run_yaml(
            r#"
name: no-failure
steps:
  - name: work
    capability: core.echo
    args: {message: ok}
  - name: notify
    capability: core.echo
    trigger: on_error
    args: {message: unreachable}
"#,
        );

        assert!(report.succeeded());
        assert_eq!(report.step_status("notify"), Some(NodeStatus::Pending));
        assert!(!report.context.contains_key("notify.result"));
    }

    #[test]
    fn on_error_step_can_read_failure_from_context() {
        let report = run_yaml(
            r#"
name: diagnose
steps:
  - name: work
    capability: core.fail
    args: {message: exploded}
  - name: diagnose
    capability: core.echo
    trigger: on_error
    args:
      message: "work said: ${work.error}"
"#,
        );

        assert!(!report.succeeded());
        let diagnosis = report.context.get("diagnose.result").unwrap();
        assert!(diagnosis.as_str().unwrap().contains("exploded"));
    }

    #[test]
    fn missing_required_param_aborts_the_run() {
        let recipe = loader::from_str(
            r#"
name: needs-input
params:
  - name: target
    required: true
steps:
  - name: a
    capability: core.echo
    args: {message: "${target}"}
"#,
        )
        .unwrap();

        let err = scheduler()
            .run(&recipe, Arc::new(ContextStore::new()), &RunOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("target"));
    }

    #[test]
    fn params_resolve_from_bindings_and_defaults() {
        let recipe = loader::from_str(
            r#"
name: parameterized
params:
  - name: greeting
    default: hello
  - name: subject
    required: true
steps:
  - name: speak
    capability: core.echo
    args:
      message: "${greeting}, ${subject}"
"#,
        )
        .unwrap();

        let options = RunOptions::default().with_param("subject", json!("world"));
        let report = scheduler()
            .run(&recipe, Arc::new(ContextStore::new()), &options)
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(
            report.context.get("speak.result"),
            Some(&json!("hello, world"))
        );
        // Parameters are also visible through the context namespace.
        assert_eq!(report.context.get("params.subject"), Some(&json!("world")));
    }

    #[test]
    fn cancellation_stops_later_levels() {
        let registry = Arc::new(CapabilityRegistry::with_builtins());
        let options = RunOptions::default().with_workers(2);
        let cancel = options.cancel.clone();
        registry.register("trip", move |_call: CapabilityCall| {
            cancel.cancel();
            Ok(Value::Null)
        });

        let recipe = loader::from_str(
            r#"
name: cancelled
steps:
  - name: first
    capability: trip
  - name: second
    capability: core.echo
    depends_on: [first]
    args: {message: never}
"#,
        )
        .unwrap();

        let report = Scheduler::new(registry, Arc::new(RecipeLibrary::new()))
            .run(&recipe, Arc::new(ContextStore::new()), &options)
            .unwrap();

        assert!(!report.succeeded());
        assert!(report.cancelled);
        assert_eq!(report.step_status("first"), Some(NodeStatus::Succeeded));
        assert_eq!(report.step_status("second"), Some(NodeStatus::Pending));
    }

    #[test]
    fn report_carries_fingerprint_and_history() {
        let report = run_yaml(
            r#"
name: audited
steps:
  - name: write
    capability: core.set
    args:
      a: 1
      b: 2
"#,
        );

        assert_eq!(report.fingerprint.len(), 64);
        // Two capability writes plus the step result record.
        assert_eq!(report.history_len, 3);
    }
}
