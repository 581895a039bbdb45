use crate::ast::{Ast, NodeId, NodeKind};

use super::function_body;

/*
末尾位置の値なし return を削除する
末尾位置:
* 関数本体
* 末尾位置にあるブロックの最後の文が if なら、その両方の分岐
* 末尾位置にあるブロックの最後の文がブロックなら、そのブロック
ループと try の本体は末尾位置ではない
*/
pub fn remove_tail_returns(ast: &mut Ast, function: NodeId) -> bool {
    let Some(body) = function_body(ast, function) else {
        return false;
    };
    let mut changed = false;
    // return を消すと直前の if が最後の文になりうる
    while remove_in_block(ast, body) {
        changed = true;
    }
    changed
}

fn remove_in_block(ast: &mut Ast, block: NodeId) -> bool {
    let Some(&last) = ast.statements(block).and_then(|stmts| stmts.last()) else {
        return false;
    };
    match ast.kind(last) {
        NodeKind::Return(None) => {
            if let Some(stmts) = ast.statements_mut(block) {
                stmts.pop();
            }
            log::debug!("removed redundant return at {}", ast.span(last));
            ast.remove_subtree(last);
            true
        }
        NodeKind::If(_) | NodeKind::Block(_) => remove_in_branch(ast, last),
        _ => false,
    }
}

fn remove_in_branch(ast: &mut Ast, branch: NodeId) -> bool {
    match ast.kind(branch) {
        NodeKind::Return(None) => {
            // 分岐そのものが return なら空のブロックにする
            log::debug!("removed redundant return at {}", ast.span(branch));
            *ast.kind_mut(branch) = NodeKind::Block(Vec::new());
            true
        }
        NodeKind::Block(_) => remove_in_block(ast, branch),
        NodeKind::If(if_) => {
            let (consequent, alternate) = (if_.consequent, if_.alternate);
            let mut changed = remove_in_branch(ast, consequent);
            if let Some(alternate) = alternate {
                changed |= remove_in_branch(ast, alternate);
            }
            changed
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remove_str(source: &str) -> String {
        let tokens = crate::lexer::lex(source).unwrap();
        let mut ast = crate::parser::parse(&tokens).unwrap();
        let function = ast.program_body()[0];
        remove_tail_returns(&mut ast, function);
        crate::codegen::generate(&ast)
    }

    #[test]
    fn test_remove_tail_returns() {
        use insta::assert_snapshot;
        assert_snapshot!(remove_str("function foo() { if (1) { y(); if (b) { return; } return; } return; }"), @r"
        function foo() {
          if (1) {
            y();
            if (b) {}
          }
        }
        ");
        assert_snapshot!(remove_str("function foo() { if (a) return; else if (b) { f(); return; } else return; }"), @r"
        function foo() {
          if (a) {} else if (b) {
            f();
          } else {}
        }
        ");
        assert_snapshot!(remove_str("function foo() { { f(); return; } }"), @r"
        function foo() {
          {
            f();
          }
        }
        ");
    }

    #[test]
    fn test_keep_non_tail_returns() {
        use insta::assert_snapshot;
        assert_snapshot!(remove_str("function foo() { if (a) { return; } f(); return 1; }"), @r"
        function foo() {
          if (a) {
            return;
          }
          f();
          return 1;
        }
        ");
        assert_snapshot!(remove_str("function foo() { for (;;) { return; } }"), @r"
        function foo() {
          for (;;) {
            return;
          }
        }
        ");
    }
}
