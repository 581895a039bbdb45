use crate::ast::{Ast, Literal, NodeId, NodeKind};
use crate::purity::is_pure;

use super::{function_body, statement_lists};

pub fn remove_side_effect_free(ast: &mut Ast, function: NodeId) -> bool {
    let Some(body) = function_body(ast, function) else {
        return false;
    };
    let mut changed = false;
    for list in statement_lists(ast, body) {
        let Some(stmts) = ast.statements(list) else {
            continue;
        };
        let prologue = if list == body {
            directive_prologue_len(ast, stmts)
        } else {
            0
        };
        let dead = stmts
            .iter()
            .enumerate()
            .filter(|&(index, &stmt)| index >= prologue && is_side_effect_free(ast, stmt))
            .map(|(_, &stmt)| stmt)
            .collect::<Vec<_>>();
        if dead.is_empty() {
            continue;
        }
        if let Some(stmts) = ast.statements_mut(list) {
            stmts.retain(|stmt| !dead.contains(stmt));
        }
        for stmt in dead {
            log::debug!("removed side-effect-free statement at {}", ast.span(stmt));
            ast.remove_subtree(stmt);
        }
        changed = true;
    }
    changed
}

fn is_side_effect_free(ast: &Ast, stmt: NodeId) -> bool {
    match ast.kind(stmt) {
        NodeKind::Empty => true,
        NodeKind::ExprStmt(expr) => is_pure(ast, *expr),
        _ => false,
    }
}

// "use strict" などの先頭の文字列リテラル文
fn directive_prologue_len(ast: &Ast, stmts: &[NodeId]) -> usize {
    stmts
        .iter()
        .take_while(|&&stmt| match ast.kind(stmt) {
            NodeKind::ExprStmt(expr) => {
                matches!(ast.kind(*expr), NodeKind::Literal(Literal::String(_)))
            }
            _ => false,
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_side_effect_free() {
        use insta::assert_snapshot;
        let tokens = crate::lexer::lex(
            "function foo() { \"use strict\"; 'a'; 1; f(); x + 1; { ; [1, 2]; } typeof y; 'b'; }",
        )
        .unwrap();
        let mut ast = crate::parser::parse(&tokens).unwrap();
        let function = ast.program_body()[0];
        assert!(remove_side_effect_free(&mut ast, function));
        assert_snapshot!(crate::codegen::generate(&ast), @r#"
        function foo() {
          "use strict";
          'a';
          f();
          x + 1;
          {}
        }
        "#);
        assert!(!remove_side_effect_free(&mut ast, function));
    }
}
