use crate::ast::{Ast, BinaryOp, MemberProperty, NodeId, NodeKind, PropertyKey, UnaryOp};

// 順序が意味を持つ: 子の純粋性と合成するときはmaxを取る
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Purelity {
    // 決定的かつ副作用無し
    // 例: 1 + 2, !x
    Pure,
    // 削除はできるが、評価するたびに新しい値ができるので移動はできない
    // 例: function () {}, []
    ImpureRead,
    // 副作用あり
    // 例: f(), a.b, x = 1
    Effectful,
}

impl Purelity {
    // 捨てても観測できる副作用がないか
    pub fn can_dce(self) -> bool {
        match self {
            Purelity::Pure | Purelity::ImpureRead => true,
            Purelity::Effectful => false,
        }
    }

    // 評価位置を動かしても結果が変わらないか
    pub fn can_move(self) -> bool {
        match self {
            Purelity::Pure => true,
            Purelity::ImpureRead | Purelity::Effectful => false,
        }
    }
}

// 評価結果が必ずプリミティブ値になるか
// ユーザー定義の valueOf/toString が呼ばれないことの判定に使う
fn yields_primitive(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Literal(_) | NodeKind::Unary(_) | NodeKind::Binary(_)
    )
}

fn operands_primitive(ast: &Ast, operands: &[NodeId]) -> bool {
    operands
        .iter()
        .all(|&operand| yields_primitive(ast.kind(operand)))
}

fn own_purelity(ast: &Ast, id: NodeId) -> Purelity {
    match ast.kind(id) {
        NodeKind::Ident(_) | NodeKind::Literal(_) | NodeKind::This => Purelity::Pure,
        NodeKind::FunctionExpr(_) | NodeKind::Array(_) | NodeKind::Object(_) => {
            Purelity::ImpureRead
        }
        NodeKind::Logical(_) | NodeKind::Conditional(_) | NodeKind::Sequence(_) => Purelity::Pure,
        NodeKind::Unary(unary) => match unary.op {
            UnaryOp::Not | UnaryOp::Typeof | UnaryOp::Void => Purelity::Pure,
            UnaryOp::Minus | UnaryOp::Plus | UnaryOp::BitNot
                if operands_primitive(ast, &[unary.argument]) =>
            {
                Purelity::Pure
            }
            UnaryOp::Minus | UnaryOp::Plus | UnaryOp::BitNot | UnaryOp::Delete => {
                Purelity::Effectful
            }
        },
        NodeKind::Binary(binary) => match binary.op {
            BinaryOp::StrictEq | BinaryOp::StrictNotEq => Purelity::Pure,
            // 右辺がオブジェクトでなければ例外になる
            BinaryOp::In | BinaryOp::Instanceof => Purelity::Effectful,
            _ if operands_primitive(ast, &[binary.left, binary.right]) => Purelity::Pure,
            _ => Purelity::Effectful,
        },
        NodeKind::Call(_)
        | NodeKind::New(_)
        | NodeKind::Assign(_)
        | NodeKind::Update(_)
        | NodeKind::Member(_) => Purelity::Effectful,
        // 文は式としては扱わない
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
        | NodeKind::Empty => Purelity::Effectful,
    }
}

// 評価される部分式
// 関数式の本体は生成時には評価されない
fn evaluated_children(ast: &Ast, id: NodeId) -> Vec<NodeId> {
    match ast.kind(id) {
        NodeKind::FunctionExpr(_) => Vec::new(),
        NodeKind::Member(member) => match member.property {
            MemberProperty::Named(_) => vec![member.object],
            MemberProperty::Computed(property) => vec![member.object, property],
        },
        NodeKind::Object(properties) => properties
            .iter()
            .flat_map(|property| match property.key {
                PropertyKey::Computed(key) => vec![key, property.value],
                PropertyKey::Named(_) | PropertyKey::String(_) | PropertyKey::Number(_) => {
                    vec![property.value]
                }
            })
            .collect(),
        _ => ast.children(id),
    }
}

pub fn purelity(ast: &Ast, id: NodeId) -> Purelity {
    let mut result = Purelity::Pure;
    let mut worklist = vec![id];
    while let Some(id) = worklist.pop() {
        result = result.max(own_purelity(ast, id));
        if result == Purelity::Effectful {
            break;
        }
        worklist.extend(evaluated_children(ast, id));
    }
    result
}

pub fn is_pure(ast: &Ast, id: NodeId) -> bool {
    purelity(ast, id).can_dce()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr_purelity(source: &str) -> Purelity {
        let tokens = crate::lexer::lex(source).unwrap();
        let ast = crate::parser::parse(&tokens).unwrap();
        let NodeKind::ExprStmt(expr) = ast.kind(ast.program_body()[0]) else {
            panic!("expected expression statement");
        };
        purelity(&ast, *expr)
    }

    #[test]
    fn test_purelity_literals_and_identifiers() {
        assert_eq!(expr_purelity("1;"), Purelity::Pure);
        assert_eq!(expr_purelity("'a';"), Purelity::Pure);
        assert_eq!(expr_purelity("x;"), Purelity::Pure);
        assert_eq!(expr_purelity("this;"), Purelity::Pure);
        assert_eq!(expr_purelity("!x && typeof y === 'string';"), Purelity::Pure);
        assert_eq!(expr_purelity("a ? b : (c, void 0);"), Purelity::Pure);
    }

    #[test]
    fn test_purelity_coercing_operators() {
        assert_eq!(expr_purelity("1 + 2 * 3;"), Purelity::Pure);
        assert_eq!(expr_purelity("-1;"), Purelity::Pure);
        // valueOf が呼ばれうる
        assert_eq!(expr_purelity("x + 1;"), Purelity::Effectful);
        assert_eq!(expr_purelity("-x;"), Purelity::Effectful);
        assert_eq!(expr_purelity("x == 1;"), Purelity::Effectful);
        assert_eq!(expr_purelity("x === 1;"), Purelity::Pure);
        assert_eq!(expr_purelity("'a' in 1;"), Purelity::Effectful);
    }

    #[test]
    fn test_purelity_fresh_values() {
        assert_eq!(expr_purelity("(function () { f(); });"), Purelity::ImpureRead);
        assert_eq!(expr_purelity("[1, x];"), Purelity::ImpureRead);
        assert_eq!(expr_purelity("({ a: 1 });"), Purelity::ImpureRead);
        assert_eq!(expr_purelity("[f()];"), Purelity::Effectful);
        assert!(Purelity::ImpureRead.can_dce());
        assert!(!Purelity::ImpureRead.can_move());
    }

    #[test]
    fn test_purelity_effects() {
        assert_eq!(expr_purelity("f();"), Purelity::Effectful);
        assert_eq!(expr_purelity("new Foo();"), Purelity::Effectful);
        assert_eq!(expr_purelity("x = 1;"), Purelity::Effectful);
        assert_eq!(expr_purelity("x++;"), Purelity::Effectful);
        assert_eq!(expr_purelity("a.b;"), Purelity::Effectful);
        assert_eq!(expr_purelity("delete x;"), Purelity::Effectful);
        assert_eq!(expr_purelity("1 && f();"), Purelity::Effectful);
    }
}
