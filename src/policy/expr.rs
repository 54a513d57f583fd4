//! Expression tree, parser, and evaluator for the policy language.

use super::{EvalError, PolicyError};

/// Values a policy can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    Soc,
    Imported,
    Price,
    Cost,
    Step,
    AvgPrice,
    MinPrice,
    MaxPrice,
}

impl Var {
    /// Every variable name the parser accepts.
    pub const NAMES: &[&str] = &[
        "soc",
        "imported",
        "price",
        "cost",
        "step",
        "avg_price",
        "min_price",
        "max_price",
    ];

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "soc" => Self::Soc,
            "imported" => Self::Imported,
            "price" => Self::Price,
            "cost" => Self::Cost,
            "step" => Self::Step,
            "avg_price" => Self::AvgPrice,
            "min_price" => Self::MinPrice,
            "max_price" => Self::MaxPrice,
            _ => return None,
        })
    }
}

/// Variable bindings for one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Env {
    pub soc: f64,
    pub imported: f64,
    pub price: f64,
    pub cost: f64,
    pub step: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

impl Env {
    fn get(&self, var: Var) -> f64 {
        match var {
            Var::Soc => self.soc,
            Var::Imported => self.imported,
            Var::Price => self.price,
            Var::Cost => self.cost,
            Var::Step => self.step,
            Var::AvgPrice => self.avg_price,
            Var::MinPrice => self.min_price,
            Var::MaxPrice => self.max_price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Min,
    Max,
    Abs,
    Clamp,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "min" => Self::Min,
            "max" => Self::Max,
            "abs" => Self::Abs,
            "clamp" => Self::Clamp,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Self::Abs => 1,
            Self::Min | Self::Max => 2,
            Self::Clamp => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// Parsed policy expression. Booleans are `1.0` / `0.0`; non-zero is true.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(Var),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
}

fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

impl Expr {
    /// Evaluates the expression against the given bindings.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::DivisionByZero`] when a divisor evaluates to zero.
    pub fn eval(&self, env: &Env) -> Result<f64, EvalError> {
        Ok(match self {
            Self::Num(n) => *n,
            Self::Var(v) => env.get(*v),
            Self::Unary(UnOp::Neg, e) => -e.eval(env)?,
            Self::Unary(UnOp::Not, e) => truth(e.eval(env)? == 0.0),
            Self::Binary(BinOp::And, l, r) => truth(l.eval(env)? != 0.0 && r.eval(env)? != 0.0),
            Self::Binary(BinOp::Or, l, r) => truth(l.eval(env)? != 0.0 || r.eval(env)? != 0.0),
            Self::Binary(op, l, r) => {
                let (a, b) = (l.eval(env)?, r.eval(env)?);
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div if b == 0.0 => return Err(EvalError::DivisionByZero),
                    BinOp::Div => a / b,
                    BinOp::Lt => truth(a < b),
                    BinOp::Le => truth(a <= b),
                    BinOp::Gt => truth(a > b),
                    BinOp::Ge => truth(a >= b),
                    BinOp::Eq => truth(a == b),
                    BinOp::Ne => truth(a != b),
                    BinOp::And | BinOp::Or => unreachable!("short-circuit ops handled above"),
                }
            }
            Self::Call(func, args) => {
                let x = args[0].eval(env)?;
                match func {
                    Func::Abs => x.abs(),
                    Func::Min => x.min(args[1].eval(env)?),
                    Func::Max => x.max(args[1].eval(env)?),
                    Func::Clamp => {
                        let lo = args[1].eval(env)?;
                        let hi = args[2].eval(env)?;
                        x.max(lo).min(hi)
                    }
                }
            }
            Self::If(cond, then, otherwise) => {
                if cond.eval(env)? != 0.0 {
                    then.eval(env)?
                } else {
                    otherwise.eval(env)?
                }
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Sym(&'static str),
}

const SYMBOLS: &[&str] = &[
    "<=", ">=", "==", "!=", "&&", "||", "<", ">", "+", "-", "*", "/", "(", ")", ",", "!",
];

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, PolicyError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == b'.' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                i += 1;
                if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
                    i += 1;
                }
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text = &src[start..i];
            let value = text.parse::<f64>().map_err(|_| PolicyError::Syntax {
                pos: start,
                message: format!("invalid number `{text}`"),
            })?;
            tokens.push((start, Token::Num(value)));
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push((start, Token::Ident(src[start..i].to_string())));
        } else if let Some(sym) = SYMBOLS.iter().find(|s| src[i..].starts_with(**s)) {
            tokens.push((i, Token::Sym(*sym)));
            i += sym.len();
        } else {
            let ch = src[i..].chars().next().unwrap_or('?');
            return Err(PolicyError::Syntax {
                pos: i,
                message: format!("unexpected character `{ch}`"),
            });
        }
    }

    Ok(tokens)
}

/// Recursive-descent parser over a token list.
/// Deepest expression tree the parser builds. Bounds the recursion of
/// parsing, evaluation and drop alike.
pub const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(p, _)| *p)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(s)) if s == kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> PolicyError {
        PolicyError::Syntax {
            pos: self.offset(),
            message: message.into(),
        }
    }

    // Every nesting level and every chained binary operator counts once.
    fn descend(&mut self) -> Result<(), PolicyError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("policy nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), PolicyError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{sym}`")))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), PolicyError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{kw}`")))
        }
    }

    fn expr(&mut self) -> Result<Expr, PolicyError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, PolicyError> {
        let base = self.depth;
        let mut lhs = self.and()?;
        while self.eat_sym("||") {
            self.descend()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(self.and()?));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, PolicyError> {
        let base = self.depth;
        let mut lhs = self.comparison()?;
        while self.eat_sym("&&") {
            self.descend()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(self.comparison()?));
        }
        self.depth = base;
        Ok(lhs)
    }

    // Comparisons do not chain.
    fn comparison(&mut self) -> Result<Expr, PolicyError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Sym("<")) => BinOp::Lt,
            Some(Token::Sym("<=")) => BinOp::Le,
            Some(Token::Sym(">")) => BinOp::Gt,
            Some(Token::Sym(">=")) => BinOp::Ge,
            Some(Token::Sym("==")) => BinOp::Eq,
            Some(Token::Sym("!=")) => BinOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr, PolicyError> {
        let base = self.depth;
        let mut lhs = self.multiplicative()?;
        loop {
            let op = if self.eat_sym("+") {
                BinOp::Add
            } else if self.eat_sym("-") {
                BinOp::Sub
            } else {
                self.depth = base;
                return Ok(lhs);
            };
            self.descend()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.multiplicative()?));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, PolicyError> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat_sym("*") {
                BinOp::Mul
            } else if self.eat_sym("/") {
                BinOp::Div
            } else {
                self.depth = base;
                return Ok(lhs);
            };
            self.descend()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> Result<Expr, PolicyError> {
        let op = if self.eat_sym("-") {
            UnOp::Neg
        } else if self.eat_sym("!") {
            UnOp::Not
        } else {
            return self.primary();
        };
        self.descend()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn primary(&mut self) -> Result<Expr, PolicyError> {
        let at = self.offset();
        match self.bump() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Sym("(")) => {
                self.descend()?;
                let inner = self.expr()?;
                self.expect_sym(")")?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::Ident(name)) if name == "if" => {
                self.descend()?;
                let cond = self.expr()?;
                self.expect_keyword("then")?;
                let then = self.expr()?;
                self.expect_keyword("else")?;
                let otherwise = self.expr()?;
                self.depth -= 1;
                Ok(Expr::If(Box::new(cond), Box::new(then), Box::new(otherwise)))
            }
            Some(Token::Ident(name)) => {
                if self.eat_sym("(") {
                    self.descend()?;
                    let call = self.call(name, at)?;
                    self.depth -= 1;
                    Ok(call)
                } else {
                    Var::from_name(&name)
                        .map(Expr::Var)
                        .ok_or(PolicyError::UnknownVariable { name, pos: at })
                }
            }
            Some(_) => {
                self.pos -= 1;
                Err(self.error("expected a number, variable, call, or `(`"))
            }
            None => Err(self.error("unexpected end of policy")),
        }
    }

    fn call(&mut self, name: String, at: usize) -> Result<Expr, PolicyError> {
        let func = Func::from_name(&name).ok_or_else(|| PolicyError::UnknownFunction {
            name: name.clone(),
            pos: at,
        })?;
        let mut args = Vec::new();
        if !self.eat_sym(")") {
            loop {
                args.push(self.expr()?);
                if self.eat_sym(")") {
                    break;
                }
                self.expect_sym(",")?;
            }
        }
        if args.len() != func.arity() {
            return Err(PolicyError::Arity {
                name,
                expected: func.arity(),
                found: args.len(),
                pos: at,
            });
        }
        Ok(Expr::Call(func, args))
    }
}

/// Parses policy source into an expression tree.
///
/// `#` starts a comment that runs to the end of the line. Reported positions
/// are byte offsets into the original source.
///
/// # Errors
///
/// Returns the first syntax, name, or arity problem found.
pub fn parse(source: &str) -> Result<Expr, PolicyError> {
    let stripped: String = source
        .split_inclusive('\n')
        .map(|line| match line.find('#') {
            Some(idx) => {
                let (code, comment) = line.split_at(idx);
                let tail = if comment.ends_with('\n') { "\n" } else { "" };
                format!("{code}{}{tail}", " ".repeat(comment.len() - tail.len()))
            }
            None => line.to_string(),
        })
        .collect();

    let tokens = tokenize(&stripped)?;
    if tokens.is_empty() {
        return Err(PolicyError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        end: stripped.len(),
        depth: 0,
    };
    let expr = parser.expr()?;
    if parser.peek().is_some() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str, env: &Env) -> f64 {
        parse(src).unwrap().eval(env).unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        let env = Env::default();
        assert_eq!(eval("1 + 2 * 3", &env), 7.0);
        assert_eq!(eval("(1 + 2) * 3", &env), 9.0);
        assert_eq!(eval("-2 - -3", &env), 1.0);
        assert_eq!(eval("10 / 4", &env), 2.5);
        assert_eq!(eval("1.5e1", &env), 15.0);
    }

    #[test]
    fn variables_and_comparisons() {
        let env = Env {
            price: 3.0,
            soc: 40.0,
            ..Env::default()
        };
        assert_eq!(eval("price < 4", &env), 1.0);
        assert_eq!(eval("price >= 4 || soc == 40", &env), 1.0);
        assert_eq!(eval("!(price < 4) && soc > 0", &env), 0.0);
    }

    #[test]
    fn if_then_else_nests() {
        let src = "if price < 2 then 20 else if price > 5 then -5 else 0";
        let mut env = Env::default();
        env.price = 1.0;
        assert_eq!(eval(src, &env), 20.0);
        env.price = 6.0;
        assert_eq!(eval(src, &env), -5.0);
        env.price = 3.0;
        assert_eq!(eval(src, &env), 0.0);
    }

    #[test]
    fn functions() {
        let env = Env {
            soc: 80.0,
            ..Env::default()
        };
        assert_eq!(eval("min(10, 100 - soc)", &env), 10.0);
        assert_eq!(eval("max(-3, abs(-7))", &env), 7.0);
        assert_eq!(eval("clamp(soc, 0, 50)", &env), 50.0);
    }

    #[test]
    fn comments_are_ignored() {
        let src = "# charge when cheap\nif price < 1 then 5 # top up\nelse 0";
        assert_eq!(eval(src, &Env::default()), 5.0);
    }

    #[test]
    fn unknown_variable_reports_position() {
        let err = parse("price + undefined_var").unwrap_err();
        assert_eq!(
            err,
            PolicyError::UnknownVariable {
                name: "undefined_var".into(),
                pos: 8
            }
        );
    }

    #[test]
    fn wrong_arity() {
        let err = parse("min(1)").unwrap_err();
        assert!(matches!(
            err,
            PolicyError::Arity {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn unknown_function() {
        assert!(matches!(
            parse("sqrt(4)").unwrap_err(),
            PolicyError::UnknownFunction { .. }
        ));
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(parse("1 +").unwrap_err(), PolicyError::Syntax { pos: 3, .. }));
        assert!(matches!(parse("(1").unwrap_err(), PolicyError::Syntax { .. }));
        assert!(matches!(parse("1 2").unwrap_err(), PolicyError::Syntax { pos: 2, .. }));
        assert!(matches!(parse("price $ 2").unwrap_err(), PolicyError::Syntax { pos: 6, .. }));
        assert!(matches!(parse("if 1 then 2").unwrap_err(), PolicyError::Syntax { .. }));
    }

    #[test]
    fn nesting_is_bounded() {
        let deep_unary = format!("{}1", "-".repeat(20_000));
        let deep_parens = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        let long_sum = vec!["1"; 10_000].join(" + ");
        for src in [&deep_unary, &deep_parens, &long_sum] {
            match parse(src).unwrap_err() {
                PolicyError::Syntax { message, .. } => {
                    assert_eq!(message, "policy nested too deeply")
                }
                other => panic!("expected a syntax error, got {other}"),
            }
        }
    }

    #[test]
    fn nesting_below_the_bound_parses() {
        let env = Env::default();
        let parens = format!("{}2{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&parens, &env), 2.0);
        assert_eq!(eval(&vec!["1"; 100].join(" + "), &env), 100.0);
        assert_eq!(eval(&format!("{}1", "-".repeat(100)), &env), 1.0);
    }

    #[test]
    fn empty_policy() {
        assert_eq!(parse("  # nothing here\n").unwrap_err(), PolicyError::Empty);
    }

    #[test]
    fn division_by_zero_is_an_eval_error() {
        let expr = parse("price / cost").unwrap();
        let env = Env {
            price: 1.0,
            ..Env::default()
        };
        assert_eq!(expr.eval(&env), Err(EvalError::DivisionByZero));
    }
}
