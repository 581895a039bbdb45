use crate::ast::{
    Ast, DeclKind, Function, Literal, LogicalOp, MemberProperty, NodeId, NodeKind, PropertyKey,
    UnaryOp, VarDecl, precedence,
};

const INDENT: &str = "  ";

#[derive(Debug)]
pub struct CodeGenerator<'a> {
    ast: &'a Ast,
    out: String,
    indent: usize,
    // 式文の先頭の位置。ここに function や { が来たら括弧で囲む
    statement_start: Option<usize>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        Self {
            ast,
            out: String::new(),
            indent: 0,
            statement_start: None,
        }
    }

    pub fn generate(mut self) -> String {
        for &stmt in self.ast.program_body() {
            self.statement(stmt);
            self.out.push('\n');
        }
        self.out
    }

    fn write(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn block(&mut self, body: &[NodeId]) {
        if body.is_empty() {
            self.write("{}");
            return;
        }
        self.write("{");
        self.indent += 1;
        for &stmt in body {
            self.newline();
            self.statement(stmt);
        }
        self.indent -= 1;
        self.newline();
        self.write("}");
    }

    fn function(&mut self, function: &Function) {
        let ast = self.ast;
        self.write("function");
        match function.name.and_then(|name| ast.ident_name(name)) {
            Some(name) => {
                self.write(" ");
                self.write(name);
            }
            None => self.write(" "),
        }
        self.write("(");
        for (i, &param) in function.params.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.expr(param, precedence::ASSIGN);
        }
        self.write(") ");
        self.block(ast.statements(function.body).unwrap_or_default());
    }

    fn var_decl(&mut self, decl: &VarDecl) {
        self.write(match decl.kind {
            DeclKind::Var => "var ",
            DeclKind::Let => "let ",
            DeclKind::Const => "const ",
        });
        for (i, declarator) in decl.declarators.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.expr(declarator.name, precedence::ASSIGN);
            if let Some(init) = declarator.init {
                self.write(" = ");
                self.expr(init, precedence::ASSIGN);
            }
        }
    }

    // if/while/for の本体。ブロックなら同じ行に続ける
    fn body(&mut self, id: NodeId) {
        self.write(" ");
        self.statement(id);
    }

    fn statement(&mut self, id: NodeId) {
        let ast = self.ast;
        match ast.kind(id) {
            NodeKind::Program(body) | NodeKind::Block(body) => self.block(body),
            NodeKind::FunctionDecl(function) => self.function(function),
            NodeKind::If(if_) => {
                self.write("if (");
                self.expr(if_.test, precedence::SEQUENCE);
                self.write(")");
                self.body(if_.consequent);
                if let Some(alternate) = if_.alternate {
                    self.write(" else");
                    self.body(alternate);
                }
            }
            NodeKind::While(while_) => {
                self.write("while (");
                self.expr(while_.test, precedence::SEQUENCE);
                self.write(")");
                self.body(while_.body);
            }
            NodeKind::For(for_) => {
                self.write("for (");
                if let Some(init) = for_.init {
                    match ast.kind(init) {
                        NodeKind::VarDecl(decl) => self.var_decl(decl),
                        _ => self.expr(init, precedence::SEQUENCE),
                    }
                }
                self.write(";");
                if let Some(test) = for_.test {
                    self.write(" ");
                    self.expr(test, precedence::SEQUENCE);
                }
                self.write(";");
                if let Some(update) = for_.update {
                    self.write(" ");
                    self.expr(update, precedence::SEQUENCE);
                }
                self.write(")");
                self.body(for_.body);
            }
            NodeKind::Try(try_) => {
                self.write("try ");
                self.statement(try_.block);
                if let Some(handler) = &try_.handler {
                    self.write(" catch ");
                    if let Some(param) = handler.param {
                        self.write("(");
                        self.expr(param, precedence::ASSIGN);
                        self.write(") ");
                    }
                    self.statement(handler.body);
                }
                if let Some(finalizer) = try_.finalizer {
                    self.write(" finally ");
                    self.statement(finalizer);
                }
            }
            NodeKind::VarDecl(decl) => {
                self.var_decl(decl);
                self.write(";");
            }
            NodeKind::ExprStmt(expr) => {
                self.statement_start = Some(self.out.len());
                self.expr(*expr, precedence::SEQUENCE);
                self.statement_start = None;
                self.write(";");
            }
            NodeKind::Return(argument) => {
                self.write("return");
                if let Some(argument) = argument {
                    self.write(" ");
                    self.expr(*argument, precedence::SEQUENCE);
                }
                self.write(";");
            }
            NodeKind::Empty => self.write(";"),
            _ => {
                // 式を文の位置に置いた場合
                self.expr(id, precedence::SEQUENCE);
                self.write(";");
            }
        }
    }

    fn args(&mut self, args: &[NodeId]) {
        self.write("(");
        for (i, &arg) in args.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.expr(arg, precedence::ASSIGN);
        }
        self.write(")");
    }

    fn at_statement_start(&self) -> bool {
        self.statement_start == Some(self.out.len())
    }

    fn expr(&mut self, id: NodeId, min_precedence: u8) {
        let ast = self.ast;
        let kind = ast.kind(id);
        let needs_paren = kind.precedence() < min_precedence
            || (self.at_statement_start()
                && matches!(kind, NodeKind::FunctionExpr(_) | NodeKind::Object(_)));
        if needs_paren {
            self.write("(");
        }
        match kind {
            NodeKind::Ident(name) => self.write(name),
            NodeKind::Literal(literal) => match literal {
                Literal::Number(raw) | Literal::String(raw) => self.write(raw),
                Literal::Bool(true) => self.write("true"),
                Literal::Bool(false) => self.write("false"),
                Literal::Null => self.write("null"),
            },
            NodeKind::This => self.write("this"),
            NodeKind::FunctionExpr(function) => self.function(function),
            NodeKind::Call(call) => {
                self.expr(call.callee, precedence::CALL);
                self.args(&call.args);
            }
            NodeKind::New(call) => {
                self.write("new ");
                // new f()() と new (f())() を区別する
                let callee_precedence = match ast.kind(call.callee) {
                    NodeKind::Call(_) => precedence::PRIMARY,
                    _ => precedence::CALL,
                };
                self.expr(call.callee, callee_precedence);
                self.args(&call.args);
            }
            NodeKind::Assign(assign) => {
                self.expr(assign.target, precedence::POSTFIX);
                self.write(" ");
                self.write(assign.op.into());
                self.write(" ");
                self.expr(assign.value, precedence::ASSIGN);
            }
            NodeKind::Update(update) => {
                let op: &str = update.op.into();
                if update.prefix {
                    self.write(op);
                    self.expr(update.argument, precedence::UNARY);
                } else {
                    self.expr(update.argument, precedence::CALL);
                    self.write(op);
                }
            }
            NodeKind::Member(member) => {
                self.expr(member.object, precedence::CALL);
                match &member.property {
                    MemberProperty::Named(name) => {
                        self.write(".");
                        self.write(name);
                    }
                    MemberProperty::Computed(property) => {
                        self.write("[");
                        self.expr(*property, precedence::SEQUENCE);
                        self.write("]");
                    }
                }
            }
            NodeKind::Unary(unary) => {
                self.write(unary.op.into());
                let separate = unary.op.is_keyword()
                    || match (unary.op, ast.kind(unary.argument)) {
                        // - -x や + ++x がトークンとしてくっつかないように
                        (UnaryOp::Minus | UnaryOp::Plus, NodeKind::Unary(inner)) => {
                            matches!(inner.op, UnaryOp::Minus | UnaryOp::Plus)
                        }
                        (UnaryOp::Minus | UnaryOp::Plus, NodeKind::Update(inner)) => inner.prefix,
                        _ => false,
                    };
                if separate {
                    self.write(" ");
                }
                self.expr(unary.argument, precedence::UNARY);
            }
            NodeKind::Binary(binary) => {
                let p = binary.op.precedence();
                let (left, right) = if binary.op.is_right_associative() {
                    // -a ** b は構文エラーなので単項演算子も括弧で囲む
                    (precedence::UNARY + 1, p)
                } else {
                    (p, p + 1)
                };
                self.expr(binary.left, left);
                self.write(" ");
                self.write(binary.op.into());
                self.write(" ");
                self.expr(binary.right, right);
            }
            NodeKind::Logical(logical) => {
                let p = logical.op.precedence();
                let left = logical_operand_precedence(ast, logical.op, logical.left, p);
                let right = logical_operand_precedence(ast, logical.op, logical.right, p + 1);
                self.expr(logical.left, left);
                self.write(" ");
                self.write(logical.op.into());
                self.write(" ");
                self.expr(logical.right, right);
            }
            NodeKind::Conditional(conditional) => {
                self.expr(conditional.test, precedence::CONDITIONAL + 1);
                self.write(" ? ");
                self.expr(conditional.consequent, precedence::ASSIGN);
                self.write(" : ");
                self.expr(conditional.alternate, precedence::ASSIGN);
            }
            NodeKind::Array(elements) => {
                self.write("[");
                for (i, &element) in elements.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.expr(element, precedence::ASSIGN);
                }
                self.write("]");
            }
            NodeKind::Object(properties) => {
                if properties.is_empty() {
                    self.write("{}");
                } else {
                    self.write("{");
                    self.indent += 1;
                    for (i, property) in properties.iter().enumerate() {
                        self.newline();
                        match &property.key {
                            PropertyKey::Named(raw)
                            | PropertyKey::String(raw)
                            | PropertyKey::Number(raw) => self.write(raw),
                            PropertyKey::Computed(key) => {
                                self.write("[");
                                self.expr(*key, precedence::ASSIGN);
                                self.write("]");
                            }
                        }
                        self.write(": ");
                        self.expr(property.value, precedence::ASSIGN);
                        if i + 1 < properties.len() {
                            self.write(",");
                        }
                    }
                    self.indent -= 1;
                    self.newline();
                    self.write("}");
                }
            }
            NodeKind::Sequence(exprs) => {
                for (i, &expr) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.expr(expr, precedence::ASSIGN);
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
        if needs_paren {
            self.write(")");
        }
    }
}

// ?? と ||/&& は括弧なしで混ぜられない
fn logical_operand_precedence(ast: &Ast, op: LogicalOp, operand: NodeId, min: u8) -> u8 {
    match ast.kind(operand) {
        NodeKind::Logical(inner)
            if (op == LogicalOp::Nullish) != (inner.op == LogicalOp::Nullish) =>
        {
            precedence::PRIMARY
        }
        _ => min,
    }
}

pub fn generate(ast: &Ast) -> String {
    CodeGenerator::new(ast).generate()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(source: &str) -> String {
        let tokens = crate::lexer::lex(source).unwrap();
        let ast = crate::parser::parse(&tokens).unwrap();
        generate(&ast)
    }

    #[test]
    fn test_generate_statements() {
        use insta::assert_snapshot;
        assert_snapshot!(roundtrip("function foo(){var x=1;if(b){}while(1)x(1);if(a)x();else y();}"), @r"
        function foo() {
          var x = 1;
          if (b) {}
          while (1) x(1);
          if (a) x(); else y();
        }
        ");
        assert_snapshot!(roundtrip("function foo(){}"), @"function foo() {}");
        assert_snapshot!(roundtrip("for(var i=0;i<n;i++){f(i)}try{g()}catch(e){}finally{h()}"), @r"
        for (var i = 0; i < n; i++) {
          f(i);
        }
        try {
          g();
        } catch (e) {} finally {
          h();
        }
        ");
    }

    #[test]
    fn test_generate_statement_start_parens() {
        use insta::assert_snapshot;
        assert_snapshot!(roundtrip("(function x(){return 1;})();"), @r"
        (function x() {
          return 1;
        })();
        ");
        assert_snapshot!(roundtrip("(function(){})();"), @"(function () {})();");
        assert_snapshot!(roundtrip("({a: 1}).a;"), @r"
        ({
          a: 1
        }).a;
        ");
        assert_snapshot!(roundtrip("_(function bar(p){return 1;});"), @r"
        _(function bar(p) {
          return 1;
        });
        ");
    }

    #[test]
    fn test_generate_precedence() {
        assert_eq!(roundtrip("(a + b) * c;"), "(a + b) * c;\n");
        assert_eq!(roundtrip("a + b * c;"), "a + b * c;\n");
        assert_eq!(roundtrip("a - (b - c);"), "a - (b - c);\n");
        assert_eq!(roundtrip("(a ** b) ** c;"), "(a ** b) ** c;\n");
        assert_eq!(roundtrip("a = (b, c);"), "a = (b, c);\n");
        assert_eq!(roundtrip("- -x;"), "- -x;\n");
        assert_eq!(roundtrip("typeof (a + b);"), "typeof (a + b);\n");
        assert_eq!(roundtrip("new (f())();"), "new (f())();\n");
        assert_eq!(roundtrip("new Foo;"), "new Foo();\n");
        assert_eq!(roundtrip("(a ? b : c)(d);"), "(a ? b : c)(d);\n");
        assert_eq!(roundtrip("!(a && b) || c;"), "!(a && b) || c;\n");
        assert_eq!(roundtrip("(-a) ** 2;"), "(-a) ** 2;\n");
        assert_eq!(roundtrip("(typeof a) ** b ** c;"), "(typeof a) ** b ** c;\n");
        assert_eq!(roundtrip("(a || b) ?? c;"), "(a || b) ?? c;\n");
        assert_eq!(roundtrip("a ?? (b && c);"), "a ?? (b && c);\n");
        assert_eq!(roundtrip("(a ?? b) || c;"), "(a ?? b) || c;\n");
    }
}
