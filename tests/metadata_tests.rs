use templ_transpiler::transpile;

#[test]
fn test_lint_ignore_only_with_calls() {
    // Template that calls another component
    let source = "package main\n\ntempl Inner() {\n\t<b>x</b>\n}\n\ntempl Outer() {\n\t@Inner()\n}\n";
    let result = transpile(source);
    assert!(result.is_ok(), "{:?}", result.errors);

    assert!(result.code.contains("//lint:file-ignore SA4006"));
    assert!(result.code.contains("ctx = templ.ClearChildren(ctx)"));

    // No calls, no lint directive
    let plain = transpile("package main\n\ntempl Inner() {\n\t<b>x</b>\n}\n");
    assert!(!plain.code.contains("//lint:file-ignore"));
    assert!(!plain.code.contains("templ.ClearChildren"));
}

#[test]
fn test_children_lookup_only_when_used() {
    let source = "package main\n\ntempl Shell() {\n\t<main>{ children... }</main>\n}\n\ntempl Leaf() {\n\t<p>leaf</p>\n}\n";
    let result = transpile(source);
    assert!(result.is_ok(), "{:?}", result.errors);

    // Exactly one template asks for its children
    assert_eq!(result.code.matches("templ.GetChildren(ctx)").count(), 1);
    let shell = result.code.find("func Shell()").unwrap();
    let leaf = result.code.find("func Leaf()").unwrap();
    let children = result.code.find("templ.GetChildren(ctx)").unwrap();
    assert!(shell < children && children < leaf);
}

#[test]
fn test_children_inside_control_flow() {
    let source = "package main\n\ntempl Maybe(show bool) {\n\tif show {\n\t\t{ children... }\n\t}\n}\n";
    let result = transpile(source);
    assert!(result.is_ok(), "{:?}", result.errors);
    assert!(result.code.contains("templ.GetChildren(ctx)"));
}

#[test]
fn test_runtime_imports() {
    let result = transpile("package views\n\ntempl A() {\n\t<p>a</p>\n}\n");
    assert!(result.code.contains("package views\n"));
    assert!(result.code.contains("import \"github.com/a-h/templ\""));
    assert!(result.code.contains("import templruntime \"github.com/a-h/templ/runtime\""));
    assert!(result.code.trim_end().ends_with("var _ = templruntime.GeneratedTemplate"));
}

#[test]
fn test_children_forwarded_into_call_block() {
    let source = "package main\n\ntempl Layout() {\n\t@Card() {\n\t\t{ children... }\n\t}\n}\n";
    let result = transpile(source);
    assert!(result.is_ok(), "{:?}", result.errors);

    // The outer template looks its children up and the nested closure renders them
    assert_eq!(result.code.matches("templ.GetChildren(ctx)").count(), 1);
    let lookup = result.code.find("templ.GetChildren(ctx)").unwrap();
    let block = result.code.find(":= templruntime.GeneratedTemplate(").unwrap();
    let render = result.code.find(".Render(ctx, templ_7745c5c3_Buffer)").unwrap();
    assert!(lookup < block && block < render);
    assert!(result.code.contains(".Render(templ.WithChildren(ctx, "));
}
