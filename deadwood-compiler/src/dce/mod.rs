use rustc_hash::FxHashSet;

use crate::ast::{Ast, NodeId, NodeKind};

mod bindings;
mod side_effect_free;
mod tail_return;
mod unreachable;
pub mod validate;

pub use bindings::eliminate_bindings;
pub use side_effect_free::remove_side_effect_free;
pub use tail_return::remove_tail_returns;
pub use unreachable::prune_unreachable;

/*
関数単位で以下を不動点まで繰り返す
1. return 以降の到達不能な文の削除
2. 末尾位置の値なし return の削除
3. 副作用の無い式文の削除
4. バインディングの削除・インライン化

内側の関数を先に処理する。トップレベルのバインディングは外部から見えるので触らない
*/
pub fn run(ast: &mut Ast) {
    let mut iteration = 0;
    loop {
        iteration += 1;
        let mut changed = false;
        for function in functions_post_order(ast) {
            // 削除されたか、関数式に変換されて別のノードになった
            if !ast.nodes.contains_key(function) || !ast.is_function(function) {
                continue;
            }
            changed |= process_function(ast, function);
        }
        log::trace!("dce iteration {} changed: {}", iteration, changed);
        if !changed {
            break;
        }
    }
}

fn process_function(ast: &mut Ast, function: NodeId) -> bool {
    let mut changed = false;
    loop {
        let mut round = prune_unreachable(ast, function);
        round |= remove_tail_returns(ast, function);
        round |= remove_side_effect_free(ast, function);
        round |= eliminate_bindings(ast, function);
        if !round {
            break;
        }
        changed = true;
    }
    if changed {
        log::trace!("simplified function {:?} at {}", function, ast.span(function));
    }
    changed
}

pub(crate) fn function_body(ast: &Ast, function: NodeId) -> Option<NodeId> {
    ast.function(function).map(|function| function.body)
}

// 子を先に並べる
pub(crate) fn functions_post_order(ast: &Ast) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut stack = vec![(ast.root, false)];
    while let Some((id, visited)) = stack.pop() {
        if visited {
            if ast.is_function(id) {
                result.push(id);
            }
            continue;
        }
        stack.push((id, true));
        for child in ast.children(id).into_iter().rev() {
            stack.push((child, false));
        }
    }
    result
}

// 入れ子の関数に入らずに辿れる文リスト(Program / Block)
pub(crate) fn statement_lists(ast: &Ast, root: NodeId) -> Vec<NodeId> {
    let mut lists = Vec::new();
    let mut worklist = vec![root];
    while let Some(stmt) = worklist.pop() {
        match ast.kind(stmt) {
            NodeKind::Program(body) | NodeKind::Block(body) => {
                lists.push(stmt);
                worklist.extend(body.iter().rev());
            }
            NodeKind::If(if_) => {
                worklist.extend(if_.alternate);
                worklist.push(if_.consequent);
            }
            NodeKind::While(while_) => worklist.push(while_.body),
            NodeKind::For(for_) => worklist.push(for_.body),
            NodeKind::Try(try_) => {
                worklist.extend(try_.finalizer);
                if let Some(handler) = &try_.handler {
                    worklist.push(handler.body);
                }
                worklist.push(try_.block);
            }
            _ => {}
        }
    }
    lists
}

pub(crate) fn subtree(ast: &Ast, root: NodeId) -> FxHashSet<NodeId> {
    let mut nodes = FxHashSet::default();
    let mut worklist = vec![root];
    while let Some(id) = worklist.pop() {
        if nodes.insert(id) {
            worklist.extend(ast.children(id));
        }
    }
    nodes
}
