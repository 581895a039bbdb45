use crate::ast::{Ast, NodeId, NodeKind, VarDecl};
use crate::purity::{is_pure, purelity};
use crate::scope::{BindingId, BindingKind, Declaration, Reference, ScopeTree, StmtPos};

/*
関数スコープ内のバインディングを1つずつ処理する
* 参照が無い: 宣言を削除。初期化式に副作用があれば式文として残す
* 読み込みが1つで、初期化式が純粋: 参照位置に初期化式を移動する
* 読み込みが1つで、同じ文リストの式文で呼び出されている関数: その場で即時実行する
* それ以外: 残す
書き換えを1つ行うたびに索引を作り直す
*/

#[derive(Debug)]
enum Rewrite {
    Remove {
        declaration: Declaration,
        statement: StmtPos,
    },
    InlineValue {
        declaration: Declaration,
        statement: StmtPos,
        reference: NodeId,
    },
    FuseCall {
        declaration: Declaration,
        statement: StmtPos,
        callee: NodeId,
    },
}

pub fn eliminate_bindings(ast: &mut Ast, function: NodeId) -> bool {
    let mut changed = false;
    loop {
        let tree = ScopeTree::build(ast);
        let Some(scope) = tree.function_scope(function) else {
            break;
        };
        if tree.is_eval_tainted(scope) {
            log::trace!("skipped function {:?} containing direct eval", function);
            break;
        }
        let rewrite = tree
            .bindings_in_function(scope)
            .into_iter()
            .find_map(|binding| plan(ast, &tree, binding));
        let Some(rewrite) = rewrite else {
            break;
        };
        apply(ast, rewrite);
        changed = true;
    }
    changed
}

fn plan(ast: &Ast, tree: &ScopeTree, binding: BindingId) -> Option<Rewrite> {
    if tree.is_protected(binding) {
        return None;
    }
    let entry = &tree.bindings[binding];
    match entry.kind {
        BindingKind::Param
        | BindingKind::CatchParam
        | BindingKind::SelfName
        | BindingKind::FunctionInBlock => return None,
        BindingKind::Var | BindingKind::Let | BindingKind::Const | BindingKind::Function => {}
    }
    let [declaration] = entry.declarations.as_slice() else {
        return None;
    };
    // for文の初期化部などは対象外
    let statement = declaration.statement?;
    if !entry.writes.is_empty() {
        return None;
    }
    match entry.reads.as_slice() {
        [] => {
            log::debug!("removing unreferenced binding `{}`", entry.name);
            Some(Rewrite::Remove {
                declaration: declaration.clone(),
                statement,
            })
        }
        [read] => match ast.kind(declaration.node) {
            NodeKind::FunctionDecl(_) => plan_fusion(ast, &entry.name, declaration, statement, read),
            NodeKind::VarDecl(_) => {
                let init = declarator_init(ast, declaration.node, declaration.name)?;
                if matches!(ast.kind(init), NodeKind::FunctionExpr(_)) {
                    plan_fusion(ast, &entry.name, declaration, statement, read)
                } else {
                    plan_value(ast, tree, &entry.name, init, declaration, statement, read)
                }
            }
            _ => None,
        },
        _ => None,
    }
}

fn declarator_init(ast: &Ast, stmt: NodeId, name: NodeId) -> Option<NodeId> {
    let NodeKind::VarDecl(decl) = ast.kind(stmt) else {
        return None;
    };
    decl.declarators
        .iter()
        .find(|declarator| declarator.name == name)
        .and_then(|declarator| declarator.init)
}

fn plan_fusion(
    ast: &Ast,
    name: &str,
    declaration: &Declaration,
    statement: StmtPos,
    read: &Reference,
) -> Option<Rewrite> {
    if !read.crossed_functions.is_empty() {
        return None;
    }
    let call_pos = *read.path.last()?;
    if call_pos.list != statement.list {
        return None;
    }
    // 関数式は宣言より後ろでしか呼べない。関数宣言は巻き上げられる
    if matches!(ast.kind(declaration.node), NodeKind::VarDecl(_))
        && call_pos.index <= statement.index
    {
        return None;
    }
    let call_stmt = *ast.statements(call_pos.list)?.get(call_pos.index)?;
    let NodeKind::ExprStmt(expr) = ast.kind(call_stmt) else {
        return None;
    };
    let NodeKind::Call(call) = ast.kind(*expr) else {
        return None;
    };
    if call.callee != read.ident {
        return None;
    }
    log::debug!("fusing single call to `{}` at {}", name, ast.span(call_stmt));
    Some(Rewrite::FuseCall {
        declaration: declaration.clone(),
        statement,
        callee: read.ident,
    })
}

fn plan_value(
    ast: &Ast,
    tree: &ScopeTree,
    name: &str,
    init: NodeId,
    declaration: &Declaration,
    statement: StmtPos,
    read: &Reference,
) -> Option<Rewrite> {
    if !substitutable(ast, tree, init, declaration, read) {
        return None;
    }
    // 宣言文が参照を支配していること。同じ文の後ろの宣言子からの参照は順序で判定する
    let dominated = read
        .path
        .iter()
        .any(|pos| pos.list == statement.list && pos.index >= statement.index);
    if !dominated || read.order <= declaration.end_order {
        return None;
    }
    if !crossing_is_safe(ast, tree, declaration, statement, read) {
        return None;
    }
    log::debug!("inlining value of `{}` at {}", name, ast.span(read.ident));
    Some(Rewrite::InlineValue {
        declaration: declaration.clone(),
        statement,
        reference: read.ident,
    })
}

// 初期化式を参照位置へ動かしても同じ値になるか
fn substitutable(
    ast: &Ast,
    tree: &ScopeTree,
    init: NodeId,
    declaration: &Declaration,
    read: &Reference,
) -> bool {
    if !purelity(ast, init).can_move() {
        return false;
    }
    let Some(&target) = tree.resolutions.get(&declaration.name) else {
        return false;
    };
    let target_scope = tree.bindings[target].scope;
    let mut worklist = vec![init];
    while let Some(id) = worklist.pop() {
        match ast.kind(id) {
            // 関数を跨ぐと別の値になる
            NodeKind::This => return false,
            NodeKind::Ident(name) => {
                // 大域変数はどこで書き換えられるか分からない
                let Some(&binding) = tree.resolutions.get(&id) else {
                    return false;
                };
                let entry = &tree.bindings[binding];
                let immutable = match entry.kind {
                    BindingKind::Const => true,
                    BindingKind::Param => !tree
                        .uses_arguments
                        .contains(&tree.binding_function(binding)),
                    BindingKind::CatchParam => true,
                    _ => false,
                };
                // ループ内のブロックで宣言されたものは反復ごとに別のバインディングになる
                let enclosing = tree.encloses(entry.scope, target_scope);
                // 宣言より前の let/const の読み込みは TDZ で例外になる
                let initialized = entry
                    .declarations
                    .iter()
                    .all(|decl| decl.end_order < declaration.order);
                if !immutable
                    || !enclosing
                    || !initialized
                    || !entry.writes.is_empty()
                    || tree.lookup(read.scope, name) != Some(binding)
                {
                    return false;
                }
            }
            _ => worklist.extend(ast.children(id)),
        }
    }
    true
}

// 入れ子の関数からの参照は、その関数が宣言の実行後にしか作られない・呼ばれないときのみ
fn crossing_is_safe(
    ast: &Ast,
    tree: &ScopeTree,
    declaration: &Declaration,
    statement: StmtPos,
    read: &Reference,
) -> bool {
    let Some(&outermost) = read.crossed_functions.first() else {
        return true;
    };
    match ast.kind(outermost) {
        // 式の評価時に作られるので、参照の位置の支配関係で十分
        NodeKind::FunctionExpr(_) => true,
        NodeKind::FunctionDecl(function) => {
            let Some(&binding) = function
                .name
                .and_then(|name| tree.resolutions.get(&name))
            else {
                return false;
            };
            let entry = &tree.bindings[binding];
            entry.kind == BindingKind::Function
                && entry.writes.is_empty()
                && entry.declarations.len() == 1
                && entry.reads.iter().all(|call| {
                    call.crossed_functions.is_empty()
                        && call.order > declaration.end_order
                        && call
                            .path
                            .iter()
                            .any(|pos| pos.list == statement.list && pos.index >= statement.index)
                })
        }
        _ => false,
    }
}

fn apply(ast: &mut Ast, rewrite: Rewrite) {
    match rewrite {
        Rewrite::Remove {
            declaration,
            statement,
        } => match ast.kind(declaration.node) {
            NodeKind::FunctionDecl(_) => {
                remove_statement(ast, statement, declaration.node);
                ast.remove_subtree(declaration.node);
            }
            _ => remove_declarator(ast, statement, declaration.node, declaration.name),
        },
        Rewrite::InlineValue {
            declaration,
            statement,
            reference,
        } => {
            let Some(init) = take_init(ast, declaration.node, declaration.name) else {
                return;
            };
            ast.replace_with(reference, init);
            remove_declarator(ast, statement, declaration.node, declaration.name);
        }
        Rewrite::FuseCall {
            declaration,
            statement,
            callee,
        } => match ast.kind(declaration.node) {
            NodeKind::FunctionDecl(_) => {
                remove_statement(ast, statement, declaration.node);
                ast.replace_with(callee, declaration.node);
                let node = &mut ast.nodes[callee];
                node.kind = match std::mem::replace(&mut node.kind, NodeKind::Empty) {
                    NodeKind::FunctionDecl(function) => NodeKind::FunctionExpr(function),
                    kind => kind,
                };
            }
            _ => {
                let Some(init) = take_init(ast, declaration.node, declaration.name) else {
                    return;
                };
                ast.replace_with(callee, init);
                remove_declarator(ast, statement, declaration.node, declaration.name);
            }
        },
    }
}

fn remove_statement(ast: &mut Ast, statement: StmtPos, stmt: NodeId) {
    if let Some(stmts) = ast.statements_mut(statement.list) {
        stmts.retain(|&s| s != stmt);
    }
}

// 宣言子から初期化式を切り離す
fn take_init(ast: &mut Ast, stmt: NodeId, name: NodeId) -> Option<NodeId> {
    let NodeKind::VarDecl(decl) = ast.kind_mut(stmt) else {
        return None;
    };
    decl.declarators
        .iter_mut()
        .find(|declarator| declarator.name == name)
        .and_then(|declarator| declarator.init.take())
}

// 宣言子を1つ取り除く。副作用のある初期化式は同じ位置の式文として残し、
// 前後の宣言子との評価順を保つために宣言文を分割する
fn remove_declarator(ast: &mut Ast, statement: StmtPos, stmt: NodeId, name: NodeId) {
    let NodeKind::VarDecl(decl) = ast.kind(stmt) else {
        return;
    };
    let kind = decl.kind;
    let Some(index) = decl
        .declarators
        .iter()
        .position(|declarator| declarator.name == name)
    else {
        return;
    };
    let before = decl.declarators[..index].to_vec();
    let after = decl.declarators[index + 1..].to_vec();
    let init = decl.declarators[index].init;
    let span = ast.span(stmt);

    ast.remove_subtree(name);
    let kept_init = match init {
        Some(init) if !is_pure(ast, init) => Some(init),
        Some(init) => {
            ast.remove_subtree(init);
            None
        }
        None => None,
    };

    let mut replacement = Vec::new();
    if !before.is_empty() {
        *ast.kind_mut(stmt) = NodeKind::VarDecl(VarDecl {
            kind,
            declarators: before,
        });
        replacement.push(stmt);
    }
    if let Some(init) = kept_init {
        replacement.push(ast.push(NodeKind::ExprStmt(init), span));
    }
    if !after.is_empty() {
        let decl = NodeKind::VarDecl(VarDecl {
            kind,
            declarators: after,
        });
        if replacement.contains(&stmt) {
            replacement.push(ast.push(decl, span));
        } else {
            *ast.kind_mut(stmt) = decl;
            replacement.push(stmt);
        }
    }
    if !replacement.contains(&stmt) {
        ast.nodes.remove(stmt);
    }
    if let Some(stmts) = ast.statements_mut(statement.list) {
        if let Some(position) = stmts.iter().position(|&s| s == stmt) {
            stmts.splice(position..=position, replacement);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eliminate_str(source: &str) -> String {
        let tokens = crate::lexer::lex(source).unwrap();
        let mut ast = crate::parser::parse(&tokens).unwrap();
        let function = ast.program_body()[0];
        eliminate_bindings(&mut ast, function);
        crate::codegen::generate(&ast)
    }

    #[test]
    fn test_split_multi_declarator() {
        use insta::assert_snapshot;
        assert_snapshot!(eliminate_str("function foo() { var a = 1, b = f(), c = 2; g(a, c); }"), @r"
        function foo() {
          f();
          g(1, 2);
        }
        ");
        assert_snapshot!(eliminate_str("function foo() { var a = h(), b = f(), c = k(); g(a, c); }"), @r"
        function foo() {
          var a = h();
          f();
          var c = k();
          g(a, c);
        }
        ");
    }

    #[test]
    fn test_remove_unused_function_declaration() {
        use insta::assert_snapshot;
        assert_snapshot!(eliminate_str("function foo() { function g() { f(); } function h() {} h(1); }"), @r"
        function foo() {
          (function h() {})(1);
        }
        ");
    }

    #[test]
    fn test_let_and_const() {
        use insta::assert_snapshot;
        assert_snapshot!(eliminate_str("function foo() { let a = 1; const b = 'x'; if (c) { let d = a; g(d + b); } }"), @r"
        function foo() {
          if (c) {
            g(1 + 'x');
          }
        }
        ");
    }

    #[test]
    fn test_fusion_requires_statement_call() {
        use insta::assert_snapshot;
        // 呼び出しの結果が使われている
        assert_snapshot!(eliminate_str("function foo() { var g = function () { return 1; }; return g(); }"), @r"
        function foo() {
          var g = function () {
            return 1;
          };
          return g();
        }
        ");
        // 宣言より前の呼び出しは関数式では不可
        assert_snapshot!(eliminate_str("function foo() { g(); var g = function () {}; }"), @r"
        function foo() {
          g();
          var g = function () {};
        }
        ");
        // 関数宣言は巻き上げられるので前でもよい
        assert_snapshot!(eliminate_str("function foo() { g(); function g() {} }"), @r"
        function foo() {
          (function g() {})();
        }
        ");
    }

    #[test]
    fn test_keep_for_init_declaration() {
        use insta::assert_snapshot;
        assert_snapshot!(eliminate_str("function foo() { for (var i = 0; ; ) {} }"), @r"
        function foo() {
          for (var i = 0;;) {}
        }
        ");
    }
}
