use rustc_hash::FxHashSet;

use crate::ast::{Ast, DeclKind, Declarator, NodeId, NodeKind, VarDecl};
use crate::scope::ScopeTree;

use super::{function_body, statement_lists, subtree};

// return より後ろの文を削除する
// 巻き上げられる宣言は残す
// * 関数宣言は return の前へ移動する
// * 生きた参照を持つ var は初期化式を除いて return の前で宣言し直す
pub fn prune_unreachable(ast: &mut Ast, function: NodeId) -> bool {
    let Some(body) = function_body(ast, function) else {
        return false;
    };
    let tree = ScopeTree::build(ast);
    let mut changed = false;
    for list in statement_lists(ast, body) {
        // 外側のリストの削除で消えている
        if !ast.nodes.contains_key(list) {
            continue;
        }
        changed |= prune_list(ast, &tree, list);
    }
    changed
}

fn prune_list(ast: &mut Ast, tree: &ScopeTree, list: NodeId) -> bool {
    let Some(stmts) = ast.statements(list) else {
        return false;
    };
    let Some(ret) = stmts
        .iter()
        .position(|&stmt| matches!(ast.kind(stmt), NodeKind::Return(_)))
    else {
        return false;
    };
    let tail = stmts[ret + 1..].to_vec();
    if tail.is_empty() || !is_prunable_tail(ast, &tail) {
        return false;
    }

    let dead = tail
        .iter()
        .flat_map(|&stmt| subtree(ast, stmt))
        .collect::<FxHashSet<_>>();
    let mut hoisted_functions = Vec::new();
    let mut removed = Vec::new();
    for &stmt in &tail {
        if matches!(ast.kind(stmt), NodeKind::FunctionDecl(_)) {
            hoisted_functions.push(stmt);
        } else {
            removed.push(stmt);
        }
    }

    let mut names = Vec::new();
    let mut seen = FxHashSet::default();
    for &stmt in &removed {
        for name in var_names(ast, stmt) {
            let Some(&binding) = tree.resolutions.get(&name) else {
                continue;
            };
            let binding_entry = &tree.bindings[binding];
            let declared_elsewhere = binding_entry
                .declarations
                .iter()
                .any(|declaration| !dead.contains(&declaration.name));
            let live = binding_entry
                .reads
                .iter()
                .chain(&binding_entry.writes)
                .any(|reference| !dead.contains(&reference.ident));
            if !declared_elsewhere && live && seen.insert(binding) {
                names.push(name);
            }
        }
    }

    let mut declarators = Vec::new();
    for name in names {
        let span = ast.span(name);
        let Some(ident) = ast.ident_name(name).map(str::to_string) else {
            continue;
        };
        declarators.push(Declarator {
            name: ast.push(NodeKind::Ident(ident), span),
            init: None,
        });
    }
    let ret_stmt = ast.statements(list).map(|stmts| stmts[ret]);
    let Some(ret_stmt) = ret_stmt else {
        return false;
    };
    let mut prefix = Vec::new();
    if !declarators.is_empty() {
        let span = ast.span(ret_stmt);
        prefix.push(ast.push(
            NodeKind::VarDecl(VarDecl {
                kind: DeclKind::Var,
                declarators,
            }),
            span,
        ));
    }
    prefix.extend(hoisted_functions.iter().copied());
    log::debug!(
        "pruned {} unreachable statements after return at {} ({} hoisted)",
        removed.len(),
        ast.span(ret_stmt),
        prefix.len()
    );

    for stmt in removed {
        ast.remove_subtree(stmt);
    }
    if let Some(stmts) = ast.statements_mut(list) {
        stmts.truncate(ret);
        stmts.extend(prefix);
        stmts.push(ret_stmt);
    }
    true
}

// let/const はこのブロックの名前解決に影響し、ブロック内の関数宣言は巻き上げの扱いが複雑なので触らない
pub(crate) fn is_prunable_tail(ast: &Ast, tail: &[NodeId]) -> bool {
    tail.iter().all(|&stmt| match ast.kind(stmt) {
        NodeKind::VarDecl(decl) => decl.kind == DeclKind::Var,
        NodeKind::FunctionDecl(_) => true,
        _ => !contains_nested_function_decl(ast, stmt),
    })
}

// var 宣言の名前(関数を跨がない)
fn var_names(ast: &Ast, stmt: NodeId) -> Vec<NodeId> {
    let mut names = Vec::new();
    let mut worklist = vec![stmt];
    while let Some(id) = worklist.pop() {
        match ast.kind(id) {
            NodeKind::VarDecl(decl) if decl.kind == DeclKind::Var => {
                names.extend(decl.declarators.iter().map(|declarator| declarator.name));
            }
            NodeKind::FunctionDecl(_) | NodeKind::FunctionExpr(_) => {}
            kind if kind.is_statement() => worklist.extend(ast.children(id)),
            _ => {}
        }
    }
    names
}

fn contains_nested_function_decl(ast: &Ast, stmt: NodeId) -> bool {
    let mut worklist = ast.children(stmt);
    while let Some(id) = worklist.pop() {
        match ast.kind(id) {
            NodeKind::FunctionDecl(_) => return true,
            NodeKind::FunctionExpr(_) => {}
            kind if kind.is_statement() => worklist.extend(ast.children(id)),
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prune_str(source: &str) -> String {
        let tokens = crate::lexer::lex(source).unwrap();
        let mut ast = crate::parser::parse(&tokens).unwrap();
        let function = ast.program_body()[0];
        prune_unreachable(&mut ast, function);
        crate::codegen::generate(&ast)
    }

    #[test]
    fn test_prune_after_return() {
        use insta::assert_snapshot;
        assert_snapshot!(prune_str("function foo() { z(); return; x(); y(); }"), @r"
        function foo() {
          z();
          return;
        }
        ");
        assert_snapshot!(prune_str("function foo() { if (a) { return 1; f(); } g(); }"), @r"
        function foo() {
          if (a) {
            return 1;
          }
          g();
        }
        ");
    }

    #[test]
    fn test_prune_hoists_declarations() {
        use insta::assert_snapshot;
        assert_snapshot!(prune_str("function foo() { return g(x); if (a) { var x = 1; } function g(v) { return v; } }"), @r"
        function foo() {
          var x;
          function g(v) {
            return v;
          }
          return g(x);
        }
        ");
        // 死んだコードからしか参照されない var は消える
        assert_snapshot!(prune_str("function foo() { return; var x = 1; f(x); }"), @r"
        function foo() {
          return;
        }
        ");
    }

    #[test]
    fn test_prune_skips_lexical_declarations() {
        use insta::assert_snapshot;
        assert_snapshot!(prune_str("function foo() { return x; let x = 1; }"), @r"
        function foo() {
          return x;
          let x = 1;
        }
        ");
        assert_snapshot!(prune_str("function foo() { return; if (a) { function g() {} } }"), @r"
        function foo() {
          return;
          if (a) {
            function g() {}
          }
        }
        ");
    }
}
