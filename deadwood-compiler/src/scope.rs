use derive_more::{From, Into};
use rustc_hash::{FxHashMap, FxHashSet};
use typed_index_collections::TiVec;

use crate::ast::{Ast, DeclKind, Function, MemberProperty, NodeId, NodeKind, PropertyKey};

/*
スコープとバインディングの索引
* var と関数宣言は最も内側の関数スコープへ、let/const はブロックスコープへ巻き上げる
* 各識別子の出現を宣言に解決し、読み込み・書き込みとして記録する
* 書き換えのたびに作り直す前提なので、ASTへの参照は NodeId でのみ持つ
*/

#[derive(Debug, Clone, Copy, From, Into, Hash, PartialEq, Eq, Ord, PartialOrd)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Copy, From, Into, Hash, PartialEq, Eq, Ord, PartialOrd)]
pub struct BindingId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Program,
    Function,
    Block,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    // Program / 関数 / Block / For / catch節の本体
    pub node: NodeId,
    pub parent: Option<ScopeId>,
    // 最も内側の関数スコープ(プログラムスコープを含む)。関数スコープなら自分自身
    pub function: ScopeId,
    pub names: FxHashMap<String, BindingId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Param,
    CatchParam,
    // 名前付き関数式の自分自身の名前
    SelfName,
    Var,
    Let,
    Const,
    Function,
    // ブロック内の関数宣言
    FunctionInBlock,
}

// 文リスト中の位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtPos {
    pub list: NodeId,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    // 宣言される名前の識別子ノード
    pub name: NodeId,
    // VarDecl / FunctionDecl / 関数 / Try
    pub node: NodeId,
    // 宣言文が文リストに直接置かれていればその位置
    pub statement: Option<StmtPos>,
    pub order: usize,
    // 初期化式や関数本体を抜けた時点の順序
    pub end_order: usize,
    pub path: Vec<StmtPos>,
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub ident: NodeId,
    // 前順走査での訪問順
    pub order: usize,
    // プログラムのルートから参照を囲む文の位置の列
    pub path: Vec<StmtPos>,
    // バインディングの関数スコープから参照までに入った関数。外側から順に
    pub crossed_functions: Vec<NodeId>,
    pub scope: ScopeId,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub kind: BindingKind,
    pub scope: ScopeId,
    pub declarations: Vec<Declaration>,
    pub reads: Vec<Reference>,
    pub writes: Vec<Reference>,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeTree {
    pub scopes: TiVec<ScopeId, Scope>,
    pub bindings: TiVec<BindingId, Binding>,
    pub function_scopes: FxHashMap<NodeId, ScopeId>,
    // 識別子ノード(参照・宣言名) → バインディング
    pub resolutions: FxHashMap<NodeId, BindingId>,
    pub free_names: FxHashSet<String>,
    // 直接evalを含む関数スコープとその祖先
    pub eval_tainted: FxHashSet<ScopeId>,
    // 自由変数としての arguments を参照する関数スコープ
    pub uses_arguments: FxHashSet<ScopeId>,
}

impl ScopeTree {
    pub fn build(ast: &Ast) -> Self {
        Builder::new(ast).build()
    }

    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<BindingId> {
        let mut current = Some(scope);
        while let Some(scope) = current {
            if let Some(&binding) = self.scopes[scope].names.get(name) {
                return Some(binding);
            }
            current = self.scopes[scope].parent;
        }
        None
    }

    // outer が inner 自身かその祖先か
    pub fn encloses(&self, outer: ScopeId, inner: ScopeId) -> bool {
        let mut current = Some(inner);
        while let Some(scope) = current {
            if scope == outer {
                return true;
            }
            current = self.scopes[scope].parent;
        }
        false
    }

    pub fn function_scope(&self, node: NodeId) -> Option<ScopeId> {
        self.function_scopes.get(&node).copied()
    }

    pub fn binding_function(&self, binding: BindingId) -> ScopeId {
        self.scopes[self.bindings[binding].scope].function
    }

    // 関数スコープと、関数を跨がずにその中にあるブロックスコープのバインディング
    pub fn bindings_in_function(&self, function: ScopeId) -> Vec<BindingId> {
        self.bindings
            .iter_enumerated()
            .filter(|(_, binding)| self.scopes[binding.scope].function == function)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn is_protected(&self, binding: BindingId) -> bool {
        self.scopes[self.bindings[binding].scope].kind == ScopeKind::Program
    }

    pub fn is_eval_tainted(&self, function: ScopeId) -> bool {
        self.eval_tainted.contains(&function)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
    ReadWrite,
}

struct Builder<'a> {
    ast: &'a Ast,
    tree: ScopeTree,
    scope: ScopeId,
    order: usize,
    path: Vec<StmtPos>,
    // (関数スコープ, 関数ノード)。先頭はプログラム
    functions: Vec<(ScopeId, NodeId)>,
}

impl<'a> Builder<'a> {
    fn new(ast: &'a Ast) -> Self {
        let mut tree = ScopeTree::default();
        let root = tree.scopes.next_key();
        tree.scopes.push(Scope {
            kind: ScopeKind::Program,
            node: ast.root,
            parent: None,
            function: root,
            names: FxHashMap::default(),
        });
        tree.function_scopes.insert(ast.root, root);
        Builder {
            ast,
            tree,
            scope: root,
            order: 0,
            path: Vec::new(),
            functions: vec![(root, ast.root)],
        }
    }

    fn build(mut self) -> ScopeTree {
        let root = self.ast.root;
        let scope = self.scope;
        self.hoist_list(scope, root, true);
        self.block_contents(root);
        self.tree
    }

    fn new_scope(&mut self, kind: ScopeKind, node: NodeId) -> ScopeId {
        let id = self.tree.scopes.next_key();
        let function = match kind {
            ScopeKind::Function | ScopeKind::Program => id,
            ScopeKind::Block => self.tree.scopes[self.scope].function,
        };
        self.tree.scopes.push(Scope {
            kind,
            node,
            parent: Some(self.scope),
            function,
            names: FxHashMap::default(),
        });
        id
    }

    fn declare(&mut self, scope: ScopeId, name: &str, kind: BindingKind) -> BindingId {
        if let Some(&existing) = self.tree.scopes[scope].names.get(name) {
            // 関数式の名前は引数やvarで上書きされる
            if self.tree.bindings[existing].kind != BindingKind::SelfName {
                return existing;
            }
        }
        let binding = self.tree.bindings.push_and_get_key(Binding {
            name: name.to_string(),
            kind,
            scope,
            declarations: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
        });
        self.tree.scopes[scope]
            .names
            .insert(name.to_string(), binding);
        binding
    }

    fn declare_ident(&mut self, scope: ScopeId, ident: NodeId, kind: BindingKind) {
        if let Some(name) = self.ast.ident_name(ident) {
            self.declare(scope, name, kind);
        }
    }

    fn statement_pos(&self, node: NodeId) -> Option<StmtPos> {
        self.path.last().copied().filter(|pos| {
            self.ast
                .statements(pos.list)
                .and_then(|body| body.get(pos.index))
                == Some(&node)
        })
    }

    fn record_declaration(&mut self, name: NodeId, node: NodeId, order: usize) {
        let Some(binding) = self
            .ast
            .ident_name(name)
            .and_then(|name| self.tree.lookup(self.scope, name))
        else {
            return;
        };
        let declaration = Declaration {
            name,
            node,
            statement: self.statement_pos(node),
            order,
            end_order: self.order,
            path: self.path.clone(),
        };
        self.tree.bindings[binding].declarations.push(declaration);
        self.tree.resolutions.insert(name, binding);
    }

    // var と関数宣言の巻き上げ。関数の内側には入らない
    fn hoist_list(&mut self, scope: ScopeId, list: NodeId, top: bool) {
        let ast = self.ast;
        for &stmt in ast.statements(list).unwrap_or_default() {
            self.hoist_statement(scope, stmt, top);
        }
    }

    fn hoist_statement(&mut self, scope: ScopeId, stmt: NodeId, top: bool) {
        let ast = self.ast;
        match ast.kind(stmt) {
            NodeKind::VarDecl(decl) if decl.kind == DeclKind::Var => {
                for declarator in &decl.declarators {
                    self.declare_ident(scope, declarator.name, BindingKind::Var);
                }
            }
            NodeKind::FunctionDecl(function) => {
                let kind = if top {
                    BindingKind::Function
                } else {
                    BindingKind::FunctionInBlock
                };
                if let Some(name) = function.name {
                    self.declare_ident(scope, name, kind);
                }
            }
            NodeKind::Block(_) => self.hoist_list(scope, stmt, false),
            NodeKind::If(if_) => {
                self.hoist_statement(scope, if_.consequent, false);
                if let Some(alternate) = if_.alternate {
                    self.hoist_statement(scope, alternate, false);
                }
            }
            NodeKind::While(while_) => self.hoist_statement(scope, while_.body, false),
            NodeKind::For(for_) => {
                if let Some(init) = for_.init {
                    self.hoist_statement(scope, init, false);
                }
                self.hoist_statement(scope, for_.body, false);
            }
            NodeKind::Try(try_) => {
                self.hoist_statement(scope, try_.block, false);
                if let Some(handler) = &try_.handler {
                    self.hoist_statement(scope, handler.body, false);
                }
                if let Some(finalizer) = try_.finalizer {
                    self.hoist_statement(scope, finalizer, false);
                }
            }
            _ => {}
        }
    }

    fn lexical_declaration(&mut self, scope: ScopeId, stmt: NodeId) {
        let ast = self.ast;
        if let NodeKind::VarDecl(decl) = ast.kind(stmt) {
            let kind = match decl.kind {
                DeclKind::Var => return,
                DeclKind::Let => BindingKind::Let,
                DeclKind::Const => BindingKind::Const,
            };
            for declarator in &decl.declarators {
                self.declare_ident(scope, declarator.name, kind);
            }
        }
    }

    // 現在のスコープで文リストを走査する
    fn block_contents(&mut self, list: NodeId) {
        let ast = self.ast;
        let body = ast.statements(list).unwrap_or_default();
        let scope = self.scope;
        for &stmt in body {
            self.lexical_declaration(scope, stmt);
        }
        for (index, &stmt) in body.iter().enumerate() {
            self.path.push(StmtPos { list, index });
            self.statement(stmt);
            self.path.pop();
        }
    }

    fn with_scope(&mut self, scope: ScopeId, f: impl FnOnce(&mut Self)) {
        let prev = std::mem::replace(&mut self.scope, scope);
        f(self);
        self.scope = prev;
    }

    fn function(&mut self, node: NodeId, function: &Function) {
        let scope = self.new_scope(ScopeKind::Function, node);
        self.tree.function_scopes.insert(node, scope);
        self.functions.push((scope, node));
        self.with_scope(scope, |this| {
            if let (NodeKind::FunctionExpr(_), Some(name)) = (this.ast.kind(node), function.name) {
                this.declare_ident(scope, name, BindingKind::SelfName);
                this.order += 1;
                this.record_declaration(name, node, this.order);
            }
            for &param in &function.params {
                this.declare_ident(scope, param, BindingKind::Param);
            }
            for &param in &function.params {
                this.order += 1;
                this.record_declaration(param, node, this.order);
            }
            this.hoist_list(scope, function.body, true);
            this.block_contents(function.body);
        });
        self.functions.pop();
    }

    fn var_decl(&mut self, stmt: NodeId) {
        let ast = self.ast;
        let NodeKind::VarDecl(decl) = ast.kind(stmt) else {
            return;
        };
        for declarator in &decl.declarators {
            self.order += 1;
            let order = self.order;
            if let Some(init) = declarator.init {
                self.expr(init);
            }
            self.record_declaration(declarator.name, stmt, order);
        }
    }

    fn statement(&mut self, id: NodeId) {
        let ast = self.ast;
        self.order += 1;
        match ast.kind(id) {
            NodeKind::Program(_) => self.block_contents(id),
            NodeKind::Block(_) => {
                let scope = self.new_scope(ScopeKind::Block, id);
                self.with_scope(scope, |this| this.block_contents(id));
            }
            NodeKind::FunctionDecl(function) => {
                self.order += 1;
                let order = self.order;
                self.function(id, function);
                if let Some(name) = function.name {
                    self.record_declaration(name, id, order);
                }
            }
            NodeKind::If(if_) => {
                self.expr(if_.test);
                self.statement(if_.consequent);
                if let Some(alternate) = if_.alternate {
                    self.statement(alternate);
                }
            }
            NodeKind::While(while_) => {
                self.expr(while_.test);
                self.statement(while_.body);
            }
            NodeKind::For(for_) => {
                let scope = self.new_scope(ScopeKind::Block, id);
                self.with_scope(scope, |this| {
                    if let Some(init) = for_.init {
                        this.lexical_declaration(scope, init);
                        match ast.kind(init) {
                            NodeKind::VarDecl(_) => this.var_decl(init),
                            _ => this.expr(init),
                        }
                    }
                    if let Some(test) = for_.test {
                        this.expr(test);
                    }
                    if let Some(update) = for_.update {
                        this.expr(update);
                    }
                    this.statement(for_.body);
                });
            }
            NodeKind::Try(try_) => {
                self.statement(try_.block);
                if let Some(handler) = &try_.handler {
                    let scope = self.new_scope(ScopeKind::Block, handler.body);
                    self.with_scope(scope, |this| {
                        if let Some(param) = handler.param {
                            this.declare_ident(scope, param, BindingKind::CatchParam);
                            this.order += 1;
                            this.record_declaration(param, id, this.order);
                        }
                        this.block_contents(handler.body);
                    });
                }
                if let Some(finalizer) = try_.finalizer {
                    self.statement(finalizer);
                }
            }
            NodeKind::VarDecl(_) => self.var_decl(id),
            NodeKind::ExprStmt(expr) => self.expr(*expr),
            NodeKind::Return(argument) => {
                if let Some(argument) = argument {
                    self.expr(*argument);
                }
            }
            NodeKind::Empty => {}
            _ => self.expr(id),
        }
    }

    fn reference(&mut self, ident: NodeId, access: Access) {
        let Some(name) = self.ast.ident_name(ident) else {
            return;
        };
        let Some(binding) = self.tree.lookup(self.scope, name) else {
            if name == "arguments" {
                let function = self.tree.scopes[self.scope].function;
                self.tree.uses_arguments.insert(function);
            }
            self.tree.free_names.insert(name.to_string());
            return;
        };
        let binding_function = self.tree.binding_function(binding);
        let crossed_functions = self
            .functions
            .iter()
            .skip_while(|(scope, _)| *scope != binding_function)
            .skip(1)
            .map(|&(_, node)| node)
            .collect();
        let reference = Reference {
            ident,
            order: self.order,
            path: self.path.clone(),
            crossed_functions,
            scope: self.scope,
        };
        let binding_entry = &mut self.tree.bindings[binding];
        match access {
            Access::Read => binding_entry.reads.push(reference),
            Access::Write => binding_entry.writes.push(reference),
            Access::ReadWrite => {
                binding_entry.reads.push(reference.clone());
                binding_entry.writes.push(reference);
            }
        }
        self.tree.resolutions.insert(ident, binding);
    }

    // 代入先。識別子なら書き込みとして記録する
    fn target(&mut self, target: NodeId, access: Access) {
        if self.ast.ident_name(target).is_some() {
            self.order += 1;
            self.reference(target, access);
        } else {
            self.expr(target);
        }
    }

    fn expr(&mut self, id: NodeId) {
        let ast = self.ast;
        self.order += 1;
        match ast.kind(id) {
            NodeKind::Ident(_) => self.reference(id, Access::Read),
            NodeKind::Literal(_) | NodeKind::This => {}
            NodeKind::FunctionExpr(function) => self.function(id, function),
            NodeKind::Call(call) => {
                if ast.ident_name(call.callee) == Some("eval")
                    && self.tree.lookup(self.scope, "eval").is_none()
                {
                    for &(scope, _) in &self.functions {
                        self.tree.eval_tainted.insert(scope);
                    }
                }
                self.expr(call.callee);
                for &arg in &call.args {
                    self.expr(arg);
                }
            }
            NodeKind::New(call) => {
                self.expr(call.callee);
                for &arg in &call.args {
                    self.expr(arg);
                }
            }
            NodeKind::Assign(assign) => {
                let access = if assign.op.reads_target() {
                    Access::ReadWrite
                } else {
                    Access::Write
                };
                self.target(assign.target, access);
                self.expr(assign.value);
            }
            NodeKind::Update(update) => self.target(update.argument, Access::ReadWrite),
            NodeKind::Member(member) => {
                self.expr(member.object);
                if let MemberProperty::Computed(property) = member.property {
                    self.expr(property);
                }
            }
            NodeKind::Unary(unary) => self.expr(unary.argument),
            NodeKind::Binary(binary) => {
                self.expr(binary.left);
                self.expr(binary.right);
            }
            NodeKind::Logical(logical) => {
                self.expr(logical.left);
                self.expr(logical.right);
            }
            NodeKind::Conditional(conditional) => {
                self.expr(conditional.test);
                self.expr(conditional.consequent);
                self.expr(conditional.alternate);
            }
            NodeKind::Array(exprs) | NodeKind::Sequence(exprs) => {
                for &expr in exprs {
                    self.expr(expr);
                }
            }
            NodeKind::Object(properties) => {
                for property in properties {
                    if let PropertyKey::Computed(key) = property.key {
                        self.expr(key);
                    }
                    self.expr(property.value);
                }
            }
            NodeKind::Program(_)
            | NodeKind::FunctionDecl(_)
            | NodeKind::Block(_)
            | NodeKind::If(_)
            | NodeKind::While(_)
            | NodeKind::For(_)
            | NodeKind::Try(_)
            | NodeKind::VarDecl(_)
            | NodeKind::ExprStmt(_)
            | NodeKind::Return(_)
            | NodeKind::Empty => self.statement(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_str(source: &str) -> (Ast, ScopeTree) {
        let tokens = crate::lexer::lex(source).unwrap();
        let ast = crate::parser::parse(&tokens).unwrap();
        let tree = ScopeTree::build(&ast);
        (ast, tree)
    }

    fn binding_named(tree: &ScopeTree, name: &str) -> BindingId {
        tree.bindings
            .iter_enumerated()
            .find(|(_, binding)| binding.name == name)
            .map(|(id, _)| id)
            .unwrap()
    }

    #[test]
    fn test_hoisted_var_resolves_earlier_reference() {
        let (_, tree) = build_str("function f() { g(x); var x = 1; }");
        let x = binding_named(&tree, "x");
        let binding = &tree.bindings[x];
        assert_eq!(binding.kind, BindingKind::Var);
        assert_eq!(binding.reads.len(), 1);
        assert_eq!(binding.declarations.len(), 1);
        assert!(binding.reads[0].order < binding.declarations[0].order);
        assert!(tree.free_names.contains("g"));
        assert!(!tree.is_protected(x));
    }

    #[test]
    fn test_shadowing_in_nested_function() {
        let (_, tree) = build_str("function f() { var x = 1; function g(x) { return x; } return x; }");
        let outer = tree
            .bindings
            .iter()
            .find(|binding| binding.name == "x" && binding.kind == BindingKind::Var)
            .unwrap();
        let param = tree
            .bindings
            .iter()
            .find(|binding| binding.name == "x" && binding.kind == BindingKind::Param)
            .unwrap();
        assert_eq!(outer.reads.len(), 1);
        assert_eq!(param.reads.len(), 1);
    }

    #[test]
    fn test_reads_and_writes() {
        let (_, tree) = build_str("function f() { var a = 1, b, c; b = a; c += 1; a++; }");
        let a = &tree.bindings[binding_named(&tree, "a")];
        let b = &tree.bindings[binding_named(&tree, "b")];
        let c = &tree.bindings[binding_named(&tree, "c")];
        assert_eq!((a.reads.len(), a.writes.len()), (2, 1));
        assert_eq!((b.reads.len(), b.writes.len()), (0, 1));
        assert_eq!((c.reads.len(), c.writes.len()), (1, 1));
    }

    #[test]
    fn test_block_scoped_declarations() {
        let (ast, tree) = build_str("function f() { let x = 1; { let x = 2; g(x); } if (a) { var y; } }");
        let lets = tree
            .bindings
            .iter()
            .filter(|binding| binding.name == "x")
            .collect::<Vec<_>>();
        assert_eq!(lets.len(), 2);
        assert!(lets.iter().all(|binding| binding.kind == BindingKind::Let));
        assert_eq!(lets[0].reads.len(), 0);
        assert_eq!(lets[1].reads.len(), 1);

        let NodeKind::FunctionDecl(f) = ast.kind(ast.program_body()[0]) else {
            panic!("expected function declaration");
        };
        let function_scope = tree.function_scope(ast.program_body()[0]).unwrap();
        let y = binding_named(&tree, "y");
        assert_eq!(tree.bindings[y].scope, function_scope);
        // ブロック内の宣言は文リストの位置を持つが、関数本体の直下ではない
        let statement = tree.bindings[y].declarations[0].statement.unwrap();
        assert_ne!(statement.list, f.body);
    }

    #[test]
    fn test_crossed_functions_and_paths() {
        let (ast, tree) = build_str("function f() { var i = 1; function g() { h(i); } g(); }");
        let f = ast.program_body()[0];
        let NodeKind::FunctionDecl(function) = ast.kind(f) else {
            panic!("expected function declaration");
        };
        let body = ast.statements(function.body).unwrap();
        let i = &tree.bindings[binding_named(&tree, "i")];
        assert_eq!(i.reads[0].crossed_functions, vec![body[1]]);
        assert_eq!(
            i.declarations[0].statement,
            Some(StmtPos {
                list: function.body,
                index: 0
            })
        );
        let g = &tree.bindings[binding_named(&tree, "g")];
        assert_eq!(g.kind, BindingKind::Function);
        assert!(g.reads[0].crossed_functions.is_empty());
        assert_eq!(
            g.reads[0].path.last(),
            Some(&StmtPos {
                list: function.body,
                index: 2
            })
        );
    }

    #[test]
    fn test_program_bindings_are_protected() {
        let (_, tree) = build_str("var x = 1; function f() {}");
        assert!(tree.is_protected(binding_named(&tree, "x")));
        assert!(tree.is_protected(binding_named(&tree, "f")));
    }

    #[test]
    fn test_self_name_is_overridden_by_param() {
        let (_, tree) = build_str("(function f(f) { return f; });");
        let param = tree
            .bindings
            .iter()
            .find(|binding| binding.kind == BindingKind::Param)
            .unwrap();
        assert_eq!(param.reads.len(), 1);
        let self_name = tree
            .bindings
            .iter()
            .find(|binding| binding.kind == BindingKind::SelfName)
            .unwrap();
        assert!(self_name.reads.is_empty());
    }

    #[test]
    fn test_direct_eval_taints_enclosing_functions() {
        let (ast, tree) = build_str("function f() { function g() { eval('x'); } } function h() {}");
        let f = tree.function_scope(ast.program_body()[0]).unwrap();
        let h = tree.function_scope(ast.program_body()[1]).unwrap();
        assert!(tree.is_eval_tainted(f));
        assert!(!tree.is_eval_tainted(h));
    }
}
