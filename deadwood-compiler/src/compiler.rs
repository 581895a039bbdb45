use crate::codegen;
use crate::dce;
use crate::dce::validate::{Snapshot, assert_valid};
use crate::lexer;
use crate::parser;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    // 変換後に不変条件を検査する
    pub validate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validate: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug)]
pub struct Compiler {
    config: Config,
}

impl Compiler {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn compile(&self, input: &str) -> crate::error::Result<String> {
        let tokens = lexer::lex(input)?;
        let mut ast = parser::parse(&tokens)?;
        log::trace!("parsed {} nodes", ast.nodes.count());
        let before = self.config.validate.then(|| Snapshot::take(&ast));
        dce::run(&mut ast);
        if let Some(before) = before {
            assert_valid(&before, &ast);
        }
        Ok(codegen::generate(&ast))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile() {
        use insta::assert_snapshot;
        let compiler = Compiler::new(Config { validate: true });
        let source = r"
    function outer() {
      var unused = 1;
      var log = function (message) {
        console.log(message);
        return;
      };
      log('hi');
      return;
      cleanup();
    }
    outer();
    ";
        assert_snapshot!(compiler.compile(source).unwrap(), @r"
        function outer() {
          (function (message) {
            console.log(message);
          })('hi');
        }
        outer();
        ");
    }

    #[test]
    fn test_compile_error() {
        let compiler = Compiler::new(Config::default());
        assert_eq!(
            compiler.compile("var = 1;").unwrap_err().to_string(),
            "CompilerError: unexpected `=` at 1:5"
        );
        assert!(compiler.compile("var s = 'abc").is_err());
    }
}
