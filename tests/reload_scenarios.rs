use std::path::PathBuf;

use liveload::orchestrator::{Control, Phase};
use liveload::{LiveloadError, Orchestrator, Runtime, ScriptEvaluator, Value};

const NEW_FOO: &str = "
fn get_foo() { return 'new foo' }

class Foo {
  attr = 'new'
  fn init(self, attr = nil) {
    if attr != nil { self.attr = attr }
  }
  fn get(self) { return 'new foo' }
  fn get_class_attr(self) { return self.attr }
}
";

fn engine() -> Orchestrator {
    Orchestrator::new(Box::new(ScriptEvaluator::new()), Runtime::default())
}

fn engine_on(dir: PathBuf) -> Orchestrator {
    Orchestrator::new(Box::new(ScriptEvaluator::new()), Runtime::new(vec![dir]))
}

fn demos() -> Orchestrator {
    engine_on(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos"))
}

fn value(engine: &mut Orchestrator, code: &str) -> Value {
    engine
        .run_unit(code, None)
        .unwrap_or_else(|e| panic!("{code:?} failed: {e}"))
        .value
}

fn pairs(items: &[(&str, &str)]) -> Value {
    Value::list(
        items
            .iter()
            .map(|(a, b)| Value::list(vec![Value::str(a), Value::str(b)]))
            .collect(),
    )
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("liveload-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn live_instance_sees_the_redefined_method() {
    let mut engine = engine();
    engine
        .run_unit("class Foo { fn get(self) { return 'old' } }\nfoo = Foo()", None)
        .unwrap();
    assert_eq!(value(&mut engine, "foo.get()"), Value::str("old"));

    let outcome = engine
        .run_unit("class Foo { fn get(self) { return 'new' } }", None)
        .unwrap();
    assert_eq!(outcome.migrations.len(), 1);
    assert_eq!(outcome.migrations[0].name, "Foo");
    assert_eq!(outcome.migrations[0].report.retagged, 1);

    assert_eq!(value(&mut engine, "foo.get()"), Value::str("new"));
    assert_eq!(value(&mut engine, "isinstance(foo, Foo)"), Value::Bool(true));
    assert_eq!(engine.phase(), Phase::Idle);
}

#[test]
fn imported_aliases_follow_a_redefinition() {
    let mut engine = demos();
    engine.run_unit("import bar", None).unwrap();
    assert!(engine.runtime().modules.contains("foo"));
    assert_eq!(value(&mut engine, "bar.get_direct()"), Value::str("old foo and bar"));

    let outcome = engine
        .run_unit("fn get_foo() { return 'new foo' }", Some("foo"))
        .unwrap();
    assert!(outcome.rebound.contains(&("bar".to_string(), "get_foo".to_string())));

    for call in ["bar.get_direct()", "bar.get_indirect()", "bar.get_internal()"] {
        assert_eq!(value(&mut engine, call), Value::str("new foo and bar"), "{call}");
    }
}

#[test]
fn redefining_a_class_migrates_instances_held_elsewhere() {
    let mut engine = demos();
    engine.run_unit("import bar", None).unwrap();
    assert_eq!(
        value(&mut engine, "bar.get_glob_objs()"),
        pairs(&[("old foo", "old"), ("old foo", "old"), ("old foo", "overridden")])
    );

    let outcome = engine.run_unit(NEW_FOO, Some("foo")).unwrap();
    let foo_migration = outcome
        .migrations
        .iter()
        .find(|m| m.name == "Foo")
        .expect("Foo was migrated");
    assert_eq!(foo_migration.report.retagged, 3);

    let expected = pairs(&[("new foo", "new"), ("new foo", "new"), ("new foo", "overridden")]);
    assert_eq!(value(&mut engine, "bar.get_glob_objs()"), expected);
    assert_eq!(value(&mut engine, "bar.get_objs()"), expected);
}

#[test]
fn subclass_instances_inherit_the_new_base() {
    let mut engine = engine();
    engine
        .run_unit(
            "class Base { fn hello(self) { return 'old hello' } }\n\
             class Child(Base) { fn own(self) { return 'mine' } }\n\
             c = Child()",
            None,
        )
        .unwrap();

    let outcome = engine
        .run_unit("class Base { fn hello(self) { return 'new hello' } }", None)
        .unwrap();
    assert_eq!(outcome.migrations[0].report.synthesized, 1);

    assert_eq!(value(&mut engine, "c.hello()"), Value::str("new hello"));
    assert_eq!(value(&mut engine, "c.own()"), Value::str("mine"));
    assert_eq!(value(&mut engine, "isinstance(c, Base)"), Value::Bool(true));
}

#[test]
fn base_and_subclass_redefined_in_one_unit() {
    let mut engine = engine();
    engine
        .run_unit(
            "class Base { fn hello(self) { return 'old base' } }\n\
             class Sub(Base) { fn own(self) { return 'old sub' } }\n\
             s = Sub()",
            None,
        )
        .unwrap();

    let outcome = engine
        .run_unit(
            "class Base { fn hello(self) { return 'new base' } }\n\
             class Sub(Base) { fn own(self) { return 'new sub' } }",
            None,
        )
        .unwrap();
    let order: Vec<&str> = outcome.migrations.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(order, vec!["Sub", "Base"]);
    assert_eq!(outcome.migrations[0].report.retagged, 1);

    assert_eq!(value(&mut engine, "s.hello()"), Value::str("new base"));
    assert_eq!(value(&mut engine, "s.own()"), Value::str("new sub"));
    assert_eq!(value(&mut engine, "isinstance(s, Sub)"), Value::Bool(true));
    assert_eq!(value(&mut engine, "isinstance(s, Base)"), Value::Bool(true));
}

#[test]
fn failed_unit_keeps_earlier_mutations_and_skips_reconciliation() {
    let mut engine = engine();
    engine.run_unit("x = 1", None).unwrap();
    let err = engine.run_unit("x = 2\nmissing()", None).unwrap_err();
    match err {
        LiveloadError::Eval(e) => assert_eq!(e.message(), "NameError: name 'missing' is not defined"),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(engine.phase(), Phase::Idle);
    assert_eq!(value(&mut engine, "x"), Value::Int(2));
}

#[test]
fn unknown_contexts_are_rejected() {
    let mut engine = engine();
    assert!(matches!(
        engine.run_unit("1", Some("nowhere")),
        Err(LiveloadError::ContextNotFound(name)) if name == "nowhere"
    ));
    assert!(matches!(
        engine.run_unit("%in nowhere", None),
        Err(LiveloadError::ContextNotFound(_))
    ));
    assert_eq!(engine.context_name(), "__main__");
}

#[test]
fn switching_contexts_changes_where_names_live() {
    let mut engine = engine();
    engine.runtime().modules.register("scratch");
    let outcome = engine.run_unit("%in scratch", None).unwrap();
    assert_eq!(outcome.control, Some(Control::Switched("scratch".into())));
    assert_eq!(value(&mut engine, "__name__"), Value::str("scratch"));

    engine.run_unit("y = 1", None).unwrap();
    let scratch = engine.runtime().modules.get("scratch").unwrap();
    assert_eq!(scratch.get("y"), Some(Value::Int(1)));

    engine.run_unit("%in __main__", None).unwrap();
    assert!(engine.run_unit("y", None).is_err());
}

#[test]
fn detached_eval_leaves_history_alone() {
    let mut engine = engine();
    engine.runtime().modules.register("side");
    engine.run_unit("40 + 2", None).unwrap();
    engine.run_unit("v = 1", Some("side")).unwrap();

    assert_eq!(value(&mut engine, "_"), Value::Int(42));
    let side = engine.runtime().modules.get("side").unwrap();
    assert_eq!(side.get("v"), Some(Value::Int(1)));
    assert!(!side.contains("_"));
    assert!(!engine.runtime().modules.main().contains("v"));
}

#[test]
fn history_artifacts_track_inputs_and_results() {
    let mut engine = engine();
    let outcome = engine.run_unit("40 + 2", None).unwrap();
    assert!(outcome.diff.is_empty());
    assert_eq!(value(&mut engine, "_"), Value::Int(42));
    assert_eq!(value(&mut engine, "_i"), Value::str("_"));
    assert_eq!(value(&mut engine, "_i1"), Value::str("40 + 2"));
    assert_eq!(value(&mut engine, "_1"), Value::Int(42));
}

#[test]
fn trace_toggle_reports_the_diff() {
    let mut engine = engine();
    let outcome = engine.run_unit("%trace", None).unwrap();
    assert_eq!(outcome.control, Some(Control::Trace(true)));
    assert!(engine.trace());

    let outcome = engine.run_unit("z = 1", None).unwrap();
    assert!(outcome.traced);
    assert!(outcome.trace_lines().contains(&"added: z".to_string()));

    engine.run_unit("%debug-module", None).unwrap();
    assert!(!engine.trace());
}

#[test]
fn failed_import_unregisters_the_module() {
    let dir = scratch_dir("broken-import");
    std::fs::write(dir.join("broken.lv"), "ok = 1\nx = missing\n").unwrap();
    let mut engine = engine_on(dir.clone());

    let err = match engine.run_unit("import broken", None) {
        Err(LiveloadError::Eval(e)) => e,
        other => panic!("expected an evaluation error, got {other:?}"),
    };
    assert!(err.message().starts_with("NameError"));
    assert!(err.trace()[0].starts_with("while importing broken"));
    assert!(!engine.runtime().modules.contains("broken"));

    let missing = engine.run_unit("import nothing_here", None).unwrap_err();
    assert!(missing.to_string().contains("ImportError"));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn slot_changes_are_reported_not_migrated() {
    let mut engine = engine();
    engine
        .run_unit("class P { slots x }\np = P()\np.x = 1", None)
        .unwrap();
    let outcome = engine.run_unit("class P { slots x, y }", None).unwrap();
    assert!(outcome.migrations[0].report.skipped.is_some());
    assert!(engine.run_unit("p.y = 2", None).is_err());
    assert_eq!(value(&mut engine, "p.x"), Value::Int(1));
}
