use derive_more::{From, Into};
use strum_macros::{EnumString, IntoStaticStr};

use crate::VecMap;
use crate::span::Span;

#[derive(Debug, Clone, Copy, From, Into, Hash, PartialEq, Eq, Ord, PartialOrd)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

// 子ノードはすべてNodeIdで所有する
// 識別子の解決は scope モジュールが名前から行い、構造的な辺は持たない
#[derive(Debug, Clone)]
pub enum NodeKind {
    // statements
    Program(Vec<NodeId>),
    FunctionDecl(Function),
    Block(Vec<NodeId>),
    If(If),
    While(While),
    For(For),
    Try(Try),
    VarDecl(VarDecl),
    ExprStmt(NodeId),
    Return(Option<NodeId>),
    Empty,
    // expressions
    Ident(String),
    Literal(Literal),
    This,
    FunctionExpr(Function),
    Call(Call),
    New(Call),
    Assign(Assign),
    Update(Update),
    Member(Member),
    Unary(Unary),
    Binary(Binary),
    Logical(Logical),
    Conditional(Conditional),
    Array(Vec<NodeId>),
    Object(Vec<Property>),
    Sequence(Vec<NodeId>),
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Option<NodeId>,
    pub params: Vec<NodeId>,
    pub body: NodeId,
}

#[derive(Debug, Clone)]
pub struct If {
    pub test: NodeId,
    pub consequent: NodeId,
    pub alternate: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct While {
    pub test: NodeId,
    pub body: NodeId,
}

#[derive(Debug, Clone)]
pub struct For {
    pub init: Option<NodeId>,
    pub test: Option<NodeId>,
    pub update: Option<NodeId>,
    pub body: NodeId,
}

#[derive(Debug, Clone)]
pub struct Try {
    pub block: NodeId,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<NodeId>,
    pub body: NodeId,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub kind: DeclKind,
    pub declarators: Vec<Declarator>,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: NodeId,
    pub init: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    // ソース上の表記をそのまま保持する
    Number(String),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub callee: NodeId,
    pub args: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Assign {
    pub op: AssignOp,
    pub target: NodeId,
    pub value: NodeId,
}

#[derive(Debug, Clone)]
pub struct Update {
    pub op: UpdateOp,
    pub prefix: bool,
    pub argument: NodeId,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub object: NodeId,
    pub property: MemberProperty,
}

#[derive(Debug, Clone)]
pub enum MemberProperty {
    Named(String),
    Computed(NodeId),
}

#[derive(Debug, Clone)]
pub struct Unary {
    pub op: UnaryOp,
    pub argument: NodeId,
}

#[derive(Debug, Clone)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: NodeId,
    pub right: NodeId,
}

#[derive(Debug, Clone)]
pub struct Logical {
    pub op: LogicalOp,
    pub left: NodeId,
    pub right: NodeId,
}

#[derive(Debug, Clone)]
pub struct Conditional {
    pub test: NodeId,
    pub consequent: NodeId,
    pub alternate: NodeId,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub key: PropertyKey,
    pub value: NodeId,
}

#[derive(Debug, Clone)]
pub enum PropertyKey {
    Named(String),
    String(String),
    Number(String),
    Computed(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
pub enum AssignOp {
    #[strum(serialize = "=")]
    Assign,
    #[strum(serialize = "+=")]
    Add,
    #[strum(serialize = "-=")]
    Sub,
    #[strum(serialize = "*=")]
    Mul,
    #[strum(serialize = "/=")]
    Div,
    #[strum(serialize = "%=")]
    Rem,
    #[strum(serialize = "**=")]
    Exp,
    #[strum(serialize = "<<=")]
    Shl,
    #[strum(serialize = ">>=")]
    Shr,
    #[strum(serialize = ">>>=")]
    UShr,
    #[strum(serialize = "&=")]
    BitAnd,
    #[strum(serialize = "|=")]
    BitOr,
    #[strum(serialize = "^=")]
    BitXor,
    #[strum(serialize = "&&=")]
    And,
    #[strum(serialize = "||=")]
    Or,
    #[strum(serialize = "??=")]
    Nullish,
}

impl AssignOp {
    // 代入先の現在値を読むかどうか
    pub fn reads_target(self) -> bool {
        self != AssignOp::Assign
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
pub enum UpdateOp {
    #[strum(serialize = "++")]
    Increment,
    #[strum(serialize = "--")]
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
pub enum UnaryOp {
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "~")]
    BitNot,
    #[strum(serialize = "typeof")]
    Typeof,
    #[strum(serialize = "void")]
    Void,
    #[strum(serialize = "delete")]
    Delete,
}

impl UnaryOp {
    pub fn is_keyword(self) -> bool {
        matches!(self, UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
pub enum BinaryOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "===")]
    StrictEq,
    #[strum(serialize = "!==")]
    StrictNotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    LtEq,
    #[strum(serialize = ">=")]
    GtEq,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Rem,
    #[strum(serialize = "**")]
    Exp,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = ">>>")]
    UShr,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "instanceof")]
    Instanceof,
}

impl BinaryOp {
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::BitOr => precedence::BIT_OR,
            BinaryOp::BitXor => precedence::BIT_XOR,
            BinaryOp::BitAnd => precedence::BIT_AND,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq => {
                precedence::EQUALITY
            }
            BinaryOp::Lt
            | BinaryOp::Gt
            | BinaryOp::LtEq
            | BinaryOp::GtEq
            | BinaryOp::In
            | BinaryOp::Instanceof => precedence::RELATIONAL,
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => precedence::SHIFT,
            BinaryOp::Add | BinaryOp::Sub => precedence::ADDITIVE,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => precedence::MULTIPLICATIVE,
            BinaryOp::Exp => precedence::EXPONENT,
        }
    }

    pub fn is_right_associative(self) -> bool {
        self == BinaryOp::Exp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
pub enum LogicalOp {
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "??")]
    Nullish,
}

impl LogicalOp {
    pub fn precedence(self) -> u8 {
        match self {
            LogicalOp::Nullish => precedence::NULLISH,
            LogicalOp::Or => precedence::OR,
            LogicalOp::And => precedence::AND,
        }
    }
}

pub mod precedence {
    pub const SEQUENCE: u8 = 1;
    pub const ASSIGN: u8 = 2;
    pub const CONDITIONAL: u8 = 3;
    pub const NULLISH: u8 = 4;
    pub const OR: u8 = 4;
    pub const AND: u8 = 5;
    pub const BIT_OR: u8 = 6;
    pub const BIT_XOR: u8 = 7;
    pub const BIT_AND: u8 = 8;
    pub const EQUALITY: u8 = 9;
    pub const RELATIONAL: u8 = 10;
    pub const SHIFT: u8 = 11;
    pub const ADDITIVE: u8 = 12;
    pub const MULTIPLICATIVE: u8 = 13;
    pub const EXPONENT: u8 = 14;
    pub const UNARY: u8 = 15;
    pub const POSTFIX: u8 = 16;
    pub const CALL: u8 = 17;
    pub const PRIMARY: u8 = 18;
}

impl NodeKind {
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
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
                | NodeKind::Empty
        )
    }

    pub fn function(&self) -> Option<&Function> {
        match self {
            NodeKind::FunctionDecl(function) | NodeKind::FunctionExpr(function) => Some(function),
            _ => None,
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            NodeKind::Sequence(_) => precedence::SEQUENCE,
            NodeKind::Assign(_) => precedence::ASSIGN,
            NodeKind::Conditional(_) => precedence::CONDITIONAL,
            NodeKind::Logical(logical) => logical.op.precedence(),
            NodeKind::Binary(binary) => binary.op.precedence(),
            NodeKind::Unary(_) => precedence::UNARY,
            NodeKind::Update(update) if update.prefix => precedence::UNARY,
            NodeKind::Update(_) => precedence::POSTFIX,
            NodeKind::Call(_) | NodeKind::New(_) | NodeKind::Member(_) => precedence::CALL,
            _ => precedence::PRIMARY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ast {
    pub nodes: VecMap<NodeId, Node>,
    pub root: NodeId,
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

impl Ast {
    pub fn new() -> Self {
        let mut nodes = VecMap::new();
        let root = nodes.push(Node {
            kind: NodeKind::Program(Vec::new()),
            span: Span::default(),
        });
        Ast { nodes, root }
    }

    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.nodes.push(Node { kind, span })
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id].span
    }

    pub fn ident_name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn function(&self, id: NodeId) -> Option<&Function> {
        self.kind(id).function()
    }

    pub fn is_function(&self, id: NodeId) -> bool {
        self.function(id).is_some()
    }

    // Program と Block が文のリストを持つ
    pub fn statements(&self, id: NodeId) -> Option<&[NodeId]> {
        match self.kind(id) {
            NodeKind::Program(body) | NodeKind::Block(body) => Some(body),
            _ => None,
        }
    }

    pub fn statements_mut(&mut self, id: NodeId) -> Option<&mut Vec<NodeId>> {
        match self.kind_mut(id) {
            NodeKind::Program(body) | NodeKind::Block(body) => Some(body),
            _ => None,
        }
    }

    pub fn program_body(&self) -> &[NodeId] {
        self.statements(self.root)
            .expect("root of an AST is always a program")
    }

    // ソース上の出現順
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.kind(id) {
            NodeKind::Program(body) | NodeKind::Block(body) => body.clone(),
            NodeKind::FunctionDecl(function) | NodeKind::FunctionExpr(function) => function
                .name
                .iter()
                .chain(function.params.iter())
                .copied()
                .chain([function.body])
                .collect(),
            NodeKind::If(if_) => [if_.test, if_.consequent]
                .into_iter()
                .chain(if_.alternate)
                .collect(),
            NodeKind::While(while_) => vec![while_.test, while_.body],
            NodeKind::For(for_) => for_
                .init
                .into_iter()
                .chain(for_.test)
                .chain(for_.update)
                .chain([for_.body])
                .collect(),
            NodeKind::Try(try_) => {
                let mut children = vec![try_.block];
                if let Some(handler) = &try_.handler {
                    children.extend(handler.param);
                    children.push(handler.body);
                }
                children.extend(try_.finalizer);
                children
            }
            NodeKind::VarDecl(decl) => decl
                .declarators
                .iter()
                .flat_map(|declarator| [Some(declarator.name), declarator.init])
                .flatten()
                .collect(),
            NodeKind::ExprStmt(expr) => vec![*expr],
            NodeKind::Return(argument) => argument.iter().copied().collect(),
            NodeKind::Empty | NodeKind::Ident(_) | NodeKind::Literal(_) | NodeKind::This => {
                Vec::new()
            }
            NodeKind::Call(call) | NodeKind::New(call) => {
                [call.callee].into_iter().chain(call.args.clone()).collect()
            }
            NodeKind::Assign(assign) => vec![assign.target, assign.value],
            NodeKind::Update(update) => vec![update.argument],
            NodeKind::Member(member) => match member.property {
                MemberProperty::Named(_) => vec![member.object],
                MemberProperty::Computed(property) => vec![member.object, property],
            },
            NodeKind::Unary(unary) => vec![unary.argument],
            NodeKind::Binary(binary) => vec![binary.left, binary.right],
            NodeKind::Logical(logical) => vec![logical.left, logical.right],
            NodeKind::Conditional(conditional) => vec![
                conditional.test,
                conditional.consequent,
                conditional.alternate,
            ],
            NodeKind::Array(elements) | NodeKind::Sequence(elements) => elements.clone(),
            NodeKind::Object(properties) => properties
                .iter()
                .flat_map(|property| {
                    let key = match property.key {
                        PropertyKey::Computed(key) => Some(key),
                        PropertyKey::Named(_) | PropertyKey::String(_) | PropertyKey::Number(_) => {
                            None
                        }
                    };
                    key.into_iter().chain([property.value])
                })
                .collect(),
        }
    }

    pub fn remove_subtree(&mut self, id: NodeId) {
        let mut worklist = vec![id];
        while let Some(id) = worklist.pop() {
            if !self.nodes.contains_key(id) {
                continue;
            }
            worklist.extend(self.children(id));
            self.nodes.remove(id);
        }
    }

    // sourceのノードをtargetの位置に移動する
    // targetを参照している親はそのまま新しいノードを指すことになる
    // targetの子は呼び出し側で処理済みであること
    pub fn replace_with(&mut self, target: NodeId, source: NodeId) {
        let node = self
            .nodes
            .remove(source)
            .expect("source node of a replacement must exist");
        self.nodes.insert(target, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_call(ast: &mut Ast) -> NodeId {
        let callee = ast.push(NodeKind::Ident("f".to_string()), Span::default());
        let arg = ast.push(
            NodeKind::Literal(Literal::Number("1".to_string())),
            Span::default(),
        );
        ast.push(
            NodeKind::Call(Call {
                callee,
                args: vec![arg],
            }),
            Span::default(),
        )
    }

    #[test]
    fn test_children_in_source_order() {
        let mut ast = Ast::new();
        let call = sample_call(&mut ast);
        let children = ast.children(call);
        assert_eq!(children.len(), 2);
        assert_eq!(ast.ident_name(children[0]), Some("f"));
        assert!(matches!(ast.kind(children[1]), NodeKind::Literal(_)));
    }

    #[test]
    fn test_remove_subtree() {
        let mut ast = Ast::new();
        let call = sample_call(&mut ast);
        let stmt = ast.push(NodeKind::ExprStmt(call), Span::default());
        let before = ast.nodes.count();
        ast.remove_subtree(stmt);
        assert_eq!(ast.nodes.count(), before - 4);
        assert!(ast.nodes.contains_key(ast.root));
    }

    #[test]
    fn test_replace_with_keeps_parent_link() {
        let mut ast = Ast::new();
        let call = sample_call(&mut ast);
        let callee = ast.children(call)[0];
        let replacement = ast.push(NodeKind::This, Span::default());
        ast.replace_with(callee, replacement);
        assert!(matches!(ast.kind(ast.children(call)[0]), NodeKind::This));
        assert!(!ast.nodes.contains_key(replacement));
    }

    #[test]
    fn test_operator_tables() {
        assert_eq!("instanceof".parse::<BinaryOp>(), Ok(BinaryOp::Instanceof));
        assert_eq!(<&str>::from(AssignOp::UShr), ">>>=");
        assert!(BinaryOp::Mul.precedence() > BinaryOp::Add.precedence());
        assert!(!AssignOp::Assign.reads_target());
        assert!(AssignOp::Add.reads_target());
    }
}
