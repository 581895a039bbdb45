use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{Ast, NodeId, NodeKind};
use crate::scope::ScopeTree;

use super::{functions_post_order, statement_lists, unreachable::is_prunable_tail};

// 変換前後で保たれるべき性質の検査
// 不整合は変換のバグなので panic する

#[derive(Debug, Clone)]
pub struct Snapshot {
    arities: FxHashMap<NodeId, Vec<String>>,
    top_level: Vec<TopLevelStatement>,
    free_names: FxHashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TopLevelStatement {
    id: NodeId,
    declared: Vec<String>,
}

impl Snapshot {
    pub fn take(ast: &Ast) -> Self {
        let arities = functions_post_order(ast)
            .into_iter()
            .map(|function| (function, param_names(ast, function)))
            .collect();
        Self {
            arities,
            top_level: top_level(ast),
            free_names: ScopeTree::build(ast).free_names,
        }
    }
}

pub fn assert_valid(before: &Snapshot, ast: &Ast) {
    for function in functions_post_order(ast) {
        if let Some(params) = before.arities.get(&function) {
            let after = param_names(ast, function);
            assert_eq!(
                &after,
                params,
                "parameters of function at {} changed",
                ast.span(function)
            );
        }
    }

    assert_eq!(
        top_level(ast),
        before.top_level,
        "top-level statements changed"
    );

    for function in functions_post_order(ast) {
        let Some(body) = ast.function(function).map(|function| function.body) else {
            continue;
        };
        for list in statement_lists(ast, body) {
            let Some(stmts) = ast.statements(list) else {
                continue;
            };
            let Some(ret) = stmts
                .iter()
                .position(|&stmt| matches!(ast.kind(stmt), NodeKind::Return(_)))
            else {
                continue;
            };
            let tail = &stmts[ret + 1..];
            assert!(
                tail.is_empty() || !is_prunable_tail(ast, tail),
                "unreachable statement after return at {}",
                ast.span(stmts[ret])
            );
        }
    }

    let free_names = ScopeTree::build(ast).free_names;
    let mut introduced = free_names
        .difference(&before.free_names)
        .cloned()
        .collect::<Vec<_>>();
    introduced.sort();
    assert!(
        introduced.is_empty(),
        "new free names appeared: {}",
        introduced.join(", ")
    );
}

fn param_names(ast: &Ast, function: NodeId) -> Vec<String> {
    ast.function(function)
        .map(|function| {
            function
                .params
                .iter()
                .filter_map(|&param| ast.ident_name(param).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn top_level(ast: &Ast) -> Vec<TopLevelStatement> {
    ast.program_body()
        .iter()
        .map(|&id| {
            let declared = match ast.kind(id) {
                NodeKind::VarDecl(decl) => decl
                    .declarators
                    .iter()
                    .filter_map(|declarator| ast.ident_name(declarator.name))
                    .map(str::to_string)
                    .collect(),
                NodeKind::FunctionDecl(function) => function
                    .name
                    .and_then(|name| ast.ident_name(name))
                    .map(str::to_string)
                    .into_iter()
                    .collect(),
                _ => Vec::new(),
            };
            TopLevelStatement { id, declared }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(source: &str) -> Ast {
        let tokens = crate::lexer::lex(source).unwrap();
        crate::parser::parse(&tokens).unwrap()
    }

    #[test]
    fn test_valid_after_run() {
        let mut ast = parse_str(
            "var a = 1; function foo(p, q) { var x = g; return x; f(); } foo(function (r) { var y; });",
        );
        let before = Snapshot::take(&ast);
        crate::dce::run(&mut ast);
        assert_valid(&before, &ast);
    }

    #[test]
    #[should_panic(expected = "top-level statements changed")]
    fn test_detect_top_level_change() {
        let mut ast = parse_str("var a = 1; f(a);");
        let before = Snapshot::take(&ast);
        let first = ast.program_body()[0];
        if let Some(stmts) = ast.statements_mut(ast.root) {
            stmts.retain(|&stmt| stmt != first);
        }
        assert_valid(&before, &ast);
    }

    #[test]
    #[should_panic(expected = "unreachable statement after return")]
    fn test_detect_unreachable_statement() {
        let ast = parse_str("function foo() { return; f(); }");
        let before = Snapshot::take(&ast);
        assert_valid(&before, &ast);
    }

    #[test]
    #[should_panic(expected = "new free names appeared: x")]
    fn test_detect_new_free_name() {
        let mut ast = parse_str("function foo() { var x; f(x); }");
        let before = Snapshot::take(&ast);
        let function = ast.program_body()[0];
        let body = ast.function(function).unwrap().body;
        if let Some(stmts) = ast.statements_mut(body) {
            stmts.remove(0);
        }
        assert_valid(&before, &ast);
    }

    #[test]
    #[should_panic(expected = "parameters of function")]
    fn test_detect_arity_change() {
        let mut ast = parse_str("function foo(a, b) {}");
        let before = Snapshot::take(&ast);
        let function = ast.program_body()[0];
        if let NodeKind::FunctionDecl(function) = ast.kind_mut(function) {
            function.params.pop();
        }
        assert_valid(&before, &ast);
    }
}
