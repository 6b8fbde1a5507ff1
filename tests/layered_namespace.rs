use liveload::Value;
use liveload::layered::{LayeredNamespace, MODULE_BINDING};
use liveload::modules::{ModuleTable, NAME_BINDING};
use liveload::namespace::{NamespaceKind, NamespaceRef};

fn view(modules: &ModuleTable) -> (NamespaceRef, LayeredNamespace) {
    let interactive = NamespaceRef::new("<interactive>", NamespaceKind::Interactive);
    interactive.set("banner", Value::str("kept across switches"));
    let view = LayeredNamespace::new(interactive.clone(), modules.main());
    (interactive, view)
}

#[test]
fn writes_are_routed_by_tier() {
    let modules = ModuleTable::default();
    let (interactive, view) = view(&modules);

    view.write("x", Value::Int(1));
    assert_eq!(modules.main().get("x"), Some(Value::Int(1)));
    assert!(!interactive.contains("x"));

    view.write("_", Value::Int(5));
    assert_eq!(interactive.get("_"), Some(Value::Int(5)));
    assert!(!modules.main().contains("_"));

    // names that only exist in the interactive tier stay there
    interactive.set("compat", Value::Int(2));
    view.write("compat", Value::Int(3));
    assert_eq!(interactive.get("compat"), Some(Value::Int(3)));
    assert!(!modules.main().contains("compat"));
}

#[test]
fn context_bindings_shadow_interactive_ones() {
    let modules = ModuleTable::default();
    let (interactive, view) = view(&modules);
    interactive.set("dup", Value::Int(1));
    modules.main().set("dup", Value::Int(2));

    assert_eq!(view.read("dup"), Some(Value::Int(2)));
    assert_eq!(view.snapshot().get("dup"), Some(&Value::Int(2)));

    assert!(view.delete("dup"));
    assert!(!interactive.contains("dup"));
    assert!(!modules.main().contains("dup"));
    assert!(!view.delete("dup"));
}

#[test]
fn switching_away_and_back_restores_the_context() {
    let modules = ModuleTable::default();
    let (interactive, mut view) = view(&modules);
    view.write("x", Value::Int(1));
    view.write("_", Value::Int(5));
    interactive.set("leftover", Value::Int(9));

    let other = modules.register("other");
    other.set("only_other", Value::Bool(true));
    let cleared = view.switch_context(other, "other");

    assert_eq!(cleared, vec!["leftover".to_string()]);
    assert_eq!(view.context_name(), "other");
    assert_eq!(view.read(NAME_BINDING), Some(Value::str("other")));
    assert_eq!(view.read("x"), None);
    assert_eq!(view.read("only_other"), Some(Value::Bool(true)));
    assert_eq!(view.read("banner"), Some(Value::str("kept across switches")));

    view.switch_context(modules.main(), "__main__");

    assert_eq!(view.read("x"), Some(Value::Int(1)));
    assert_eq!(view.read("_"), Some(Value::Int(5)));
    assert_eq!(view.read("only_other"), None);
    assert_eq!(interactive.get(NAME_BINDING), Some(Value::str("__main__")));
    match view.read(MODULE_BINDING) {
        Some(Value::Module(module)) => assert!(module.namespace.same(&modules.main())),
        other => panic!("expected the module handle, got {other:?}"),
    }
}
