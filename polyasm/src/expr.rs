use std::fmt::{self, Display};
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1, take_while_m_n},
    character::complete::{anychar, char, none_of, one_of, satisfy},
    combinator::{all_consuming, cut, map, map_res, not, opt, peek, recognize, value},
    multi::{fold_many0, many0_count},
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};
use strum::EnumString;

use crate::{
    constants::is_ident_char,
    error::{AsmError, AsmResult},
};

/// Result of evaluating an expression. `Unresolved` means some label it
/// depends on has no value yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Unresolved,
    Integer(i64),
    Str(String),
}

impl Value {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Value::Unresolved)
    }

    /// The integer, if there is one. Strings are a type mismatch.
    pub fn integer(&self) -> AsmResult<Option<i64>> {
        match self {
            Value::Unresolved => Ok(None),
            Value::Integer(v) => Ok(Some(*v)),
            Value::Str(s) => Err(AsmError::TypeMismatch(format!(
                "expected a number, found \"{}\"",
                s
            ))),
        }
    }

    fn bool(b: bool) -> Value {
        Value::Integer(b as i64)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unresolved => write!(f, "<unresolved>"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// What the evaluator needs from the outside world.
pub trait Resolver {
    /// Value of a (possibly local) label; `Ok(None)` if it is not known yet.
    fn label_value(&mut self, name: &str) -> AsmResult<Option<i64>>;
    /// `$`: storage PC plus the code-gen offset.
    fn run_pc(&self) -> i64;
    /// `$$`: storage PC.
    fn storage_pc(&self) -> i64;
    fn warn(&mut self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
enum Function {
    Strlen,
    High,
    Low,
    Msw,
    Lsw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    LogicalOr,
    LogicalAnd,
    Or,
    Xor,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Not,
    Complement,
}

impl Operator {
    /// Binding strength as a binary operator; `None` for unary-only ones.
    fn precedence(self) -> Option<u8> {
        use Operator::*;
        Some(match self {
            LogicalOr => 1,
            LogicalAnd => 2,
            Or => 3,
            Xor => 4,
            And => 5,
            Eq | Ne => 6,
            Lt | Le | Gt | Ge => 7,
            Shl | Shr => 8,
            Add | Sub => 9,
            Mul | Div | Mod => 10,
            Not | Complement => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(i64),
    Str(String),
    Ident(String),
    RunPc,
    StoragePc,
    LParen,
    RParen,
    Op(Operator),
}

impl Token {
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Number(_)
                | Token::Str(_)
                | Token::Ident(_)
                | Token::RunPc
                | Token::StoragePc
                | Token::RParen
        )
    }
}

/// A token as it appears in the text, before its value is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme<'a> {
    Number(&'a str, u32),
    Quoted(char, &'a str),
    Ident(&'a str),
    RunPc,
    StoragePc,
    LParen,
    RParen,
    Op(Operator),
}

fn is_bin(c: char) -> bool {
    matches!(c, '0' | '1')
}

fn is_oct(c: char) -> bool {
    matches!(c, '0'..='7')
}

fn is_dec(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_hex(c: char) -> bool {
    c.is_ascii_hexdigit()
}

/// A digit run that may be broken up with `_`.
fn digits<'a>(is_digit: fn(char) -> bool) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    take_while1(move |c: char| is_digit(c) || c == '_')
}

/// Digits and radix of a numeric literal in any of its spellings.
fn number(i: &str) -> IResult<&str, (&str, u32)> {
    terminated(
        alt((
            map(preceded(tag_no_case("0x"), digits(is_hex)), |d| (d, 16)),
            map(preceded(tag_no_case("0b"), digits(is_bin)), |d| (d, 2)),
            map(preceded(tag_no_case("0o"), digits(is_oct)), |d| (d, 8)),
            map(
                terminated(
                    recognize(pair(satisfy(is_dec), take_while(|c: char| is_hex(c) || c == '_'))),
                    one_of("hH"),
                ),
                |d| (d, 16),
            ),
            map(terminated(digits(is_bin), one_of("bB")), |d| (d, 2)),
            map(terminated(digits(is_oct), one_of("oOqQ")), |d| (d, 8)),
            map(
                recognize(pair(satisfy(is_dec), take_while(|c: char| is_dec(c) || c == '_'))),
                |d| (d, 10),
            ),
        )),
        not(satisfy(is_ident_char)),
    )(i)
}

/// `$1F`. Once a hex digit follows the `$` it has to be a number.
fn dollar_hex(i: &str) -> IResult<&str, &str> {
    preceded(
        pair(char('$'), peek(satisfy(is_hex))),
        cut(terminated(digits(is_hex), not(satisfy(is_ident_char)))),
    )(i)
}

fn identifier(i: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(one_of(".@")),
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_ident_char),
    )))(i)
}

/// A quoted literal: its quote char and the body with escapes still in.
pub(crate) fn quoted(i: &str) -> IResult<&str, (char, &str)> {
    let (i, quote) = one_of("\"'")(i)?;
    let (i, body) = recognize(many0_count(alt((
        preceded(char('\\'), anychar),
        satisfy(move |c| c != quote && c != '\\'),
    ))))(i)?;
    let (i, _) = cut(char(quote))(i)?;
    Ok((i, (quote, body)))
}

fn operator(i: &str) -> IResult<&str, Operator> {
    use Operator::*;

    alt((
        alt((
            value(LogicalOr, tag("||")),
            value(LogicalAnd, tag("&&")),
            value(Eq, tag("==")),
            value(Ne, alt((tag("!="), tag("<>")))),
            value(Le, tag("<=")),
            value(Ge, tag(">=")),
            value(Shl, tag("<<")),
            value(Shr, tag(">>")),
        )),
        alt((
            value(Or, char('|')),
            value(Xor, char('^')),
            value(And, char('&')),
            value(Eq, char('=')),
            value(Lt, char('<')),
            value(Gt, char('>')),
            value(Add, char('+')),
            value(Sub, char('-')),
            value(Mul, char('*')),
            value(Div, char('/')),
            value(Mod, char('%')),
            value(Not, char('!')),
            value(Complement, char('~')),
        )),
    ))(i)
}

/// `%` starts a binary number only where an operand is expected; after an
/// operand it is the modulo operator.
fn lexeme(i: &str, operand_position: bool) -> IResult<&str, Lexeme<'_>> {
    if operand_position {
        if let Ok((rest, d)) = preceded(char('%'), digits(is_bin))(i) {
            return Ok((rest, Lexeme::Number(d, 2)));
        }
    }

    alt((
        map(number, |(d, radix)| Lexeme::Number(d, radix)),
        value(Lexeme::StoragePc, tag("$$")),
        map(dollar_hex, |d| Lexeme::Number(d, 16)),
        value(Lexeme::RunPc, char('$')),
        map(quoted, |(quote, body)| Lexeme::Quoted(quote, body)),
        value(Lexeme::LParen, char('(')),
        value(Lexeme::RParen, char(')')),
        map(identifier, Lexeme::Ident),
        map(operator, Lexeme::Op),
    ))(i)
}

fn lex_error(rest: &str) -> AsmError {
    match rest.chars().next() {
        Some('0'..='9' | '$') => AsmError::syntax(format!("malformed number {}", rest)),
        Some('"' | '\'') => AsmError::syntax("unterminated string"),
        Some(c) => AsmError::syntax(format!("unexpected character {}", c)),
        None => AsmError::syntax("unexpected end of expression"),
    }
}

/// Parse a numeric literal in any of the accepted radix spellings.
pub fn parse_number(text: &str) -> AsmResult<i64> {
    let (_, (digits, radix)) = all_consuming(number)(text)
        .map_err(|_| AsmError::syntax(format!("malformed number {}", text)))?;
    parse_digits(digits, radix)
}

fn parse_digits(digits: &str, radix: u32) -> AsmResult<i64> {
    let digits = digits.replace('_', "");
    u64::from_str_radix(&digits, radix)
        .map(|v| v as i64)
        .map_err(|_| AsmError::Range(format!("number {} does not fit in 64 bits", digits)))
}

/// Decode the body of a quoted literal. Every char stands for one byte.
fn unescape(body: &str) -> AsmResult<String> {
    let escape = preceded(
        char('\\'),
        alt((
            value('\n', char('n')),
            value('\r', char('r')),
            value('\t', char('t')),
            value('\0', char('0')),
            one_of("\\\"'"),
            map_res(
                preceded(char('x'), take_while_m_n(2, 2, is_hex)),
                |hex| u8::from_str_radix(hex, 16).map(char::from),
            ),
        )),
    );
    let decoded = fold_many0(alt((escape, none_of("\\"))), String::new, |mut out, c| {
        out.push(c);
        out
    });

    let decoded: IResult<&str, String> = all_consuming(decoded)(body);
    match decoded {
        Ok((_, out)) => Ok(out),
        Err(nom::Err::Error(err) | nom::Err::Failure(err)) => {
            let bad = err.input;
            Err(match bad.chars().nth(1) {
                None => AsmError::syntax("dangling escape"),
                Some('x') => AsmError::syntax(format!("bad escape {}", bad.get(..4).unwrap_or(bad))),
                Some(other) => AsmError::syntax(format!("unknown escape \\{}", other)),
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(AsmError::syntax("dangling escape")),
    }
}

impl Token {
    fn decode(lexeme: Lexeme<'_>) -> AsmResult<Token> {
        Ok(match lexeme {
            Lexeme::Number(digits, radix) => Token::Number(parse_digits(digits, radix)?),
            Lexeme::Quoted('"', body) => Token::Str(unescape(body)?),
            Lexeme::Quoted(_, body) => {
                let decoded = unescape(body)?;
                let mut chars = decoded.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Token::Number(c as i64),
                    _ => {
                        return Err(AsmError::syntax(format!(
                            "character literal must hold one character: '{}'",
                            body
                        )))
                    }
                }
            }
            Lexeme::Ident(name) => Token::Ident(name.to_owned()),
            Lexeme::RunPc => Token::RunPc,
            Lexeme::StoragePc => Token::StoragePc,
            Lexeme::LParen => Token::LParen,
            Lexeme::RParen => Token::RParen,
            Lexeme::Op(op) => Token::Op(op),
        })
    }
}

fn tokenize(text: &str) -> AsmResult<Vec<Token>> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let operand_position = !tokens.last().map_or(false, Token::ends_operand);
        let (next, found) = lexeme(rest, operand_position).map_err(|_| lex_error(rest))?;
        tokens.push(Token::decode(found)?);
        rest = next.trim_start();
    }

    Ok(tokens)
}

/// Precedence-climbing evaluator over one expression.
pub struct Evaluator<'r> {
    tokens: Vec<Token>,
    pos: usize,
    resolver: &'r mut dyn Resolver,
}

impl<'r> Evaluator<'r> {
    pub fn new(text: &str, resolver: &'r mut dyn Resolver) -> AsmResult<Self> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
            resolver,
        })
    }

    pub fn evaluate(mut self) -> AsmResult<Value> {
        if self.tokens.is_empty() {
            return Err(AsmError::syntax("missing expression"));
        }
        let value = self.expression(0)?;
        match self.tokens.get(self.pos) {
            None => Ok(value),
            Some(token) => Err(AsmError::syntax(format!("unexpected {:?}", token))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expression(&mut self, threshold: u8) -> AsmResult<Value> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            let Some(precedence) = op.precedence() else {
                return Err(AsmError::syntax(format!("unexpected {:?}", op)));
            };
            if precedence <= threshold {
                break;
            }
            self.pos += 1;
            let rhs = self.expression(precedence)?;
            lhs = self.binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> AsmResult<Value> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| AsmError::syntax("unexpected end of expression"))?;
        self.pos += 1;

        match token {
            Token::Number(v) => Ok(Value::Integer(v)),
            Token::Str(s) => Ok(Value::Str(s)),
            Token::RunPc => Ok(Value::Integer(self.resolver.run_pc())),
            Token::StoragePc => Ok(Value::Integer(self.resolver.storage_pc())),
            Token::LParen => {
                let value = self.expression(0)?;
                self.close_paren()?;
                Ok(value)
            }
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    if let Ok(function) = Function::from_str(&name) {
                        self.pos += 1;
                        let argument = self.expression(0)?;
                        self.close_paren()?;
                        return call(function, argument);
                    }
                }
                Ok(match self.resolver.label_value(&name)? {
                    Some(v) => Value::Integer(v),
                    None => Value::Unresolved,
                })
            }
            Token::Op(op @ (Operator::Sub | Operator::Add | Operator::Not | Operator::Complement)) => {
                let operand = self.unary()?;
                let v = match operand {
                    Value::Unresolved => return Ok(Value::Unresolved),
                    Value::Integer(v) => v,
                    Value::Str(_) => {
                        return Err(AsmError::TypeMismatch(format!(
                            "operator {:?} cannot be applied to a string",
                            op
                        )))
                    }
                };
                Ok(Value::Integer(match op {
                    Operator::Sub => v.wrapping_neg(),
                    Operator::Not => (v == 0) as i64,
                    Operator::Complement => !v,
                    _ => v,
                }))
            }
            other => Err(AsmError::syntax(format!("unexpected {:?}", other))),
        }
    }

    fn close_paren(&mut self) -> AsmResult<()> {
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            Ok(())
        } else {
            Err(AsmError::syntax("missing )"))
        }
    }

    fn binary(&mut self, op: Operator, lhs: Value, rhs: Value) -> AsmResult<Value> {
        use Operator::*;

        if matches!(op, Div | Mod) && rhs == Value::Integer(0) {
            return Err(AsmError::DivideByZero);
        }

        let (a, b) = match (lhs, rhs) {
            (Value::Unresolved, _) | (_, Value::Unresolved) => return Ok(Value::Unresolved),
            (Value::Integer(a), Value::Integer(b)) => (a, b),
            (Value::Str(a), Value::Str(b)) => return string_op(op, a, b),
            (a, b) => {
                return Err(AsmError::TypeMismatch(format!(
                    "cannot combine {} and {}",
                    a, b
                )))
            }
        };

        Ok(match op {
            LogicalOr => Value::bool(a != 0 || b != 0),
            LogicalAnd => Value::bool(a != 0 && b != 0),
            Or => Value::Integer(a | b),
            Xor => Value::Integer(a ^ b),
            And => Value::Integer(a & b),
            Eq => Value::bool(a == b),
            Ne => Value::bool(a != b),
            Lt => Value::bool(a < b),
            Le => Value::bool(a <= b),
            Gt => Value::bool(a > b),
            Ge => Value::bool(a >= b),
            Shl | Shr => {
                if b < 0 {
                    self.resolver.warn("shift by a negative count");
                }
                Value::Integer(if op == Shl {
                    a.wrapping_shl(b as u32)
                } else {
                    a.wrapping_shr(b as u32)
                })
            }
            Add => Value::Integer(a.wrapping_add(b)),
            Sub => Value::Integer(a.wrapping_sub(b)),
            Mul => Value::Integer(a.wrapping_mul(b)),
            Div => Value::Integer(a.wrapping_div(b)),
            Mod => Value::Integer(a.wrapping_rem(b)),
            Not | Complement => unreachable!("unary operators have no precedence"),
        })
    }
}

fn string_op(op: Operator, a: String, b: String) -> AsmResult<Value> {
    use Operator::*;
    Ok(match op {
        Add => Value::Str(a + &b),
        Eq => Value::bool(a == b),
        Ne => Value::bool(a != b),
        Lt => Value::bool(a < b),
        Le => Value::bool(a <= b),
        Gt => Value::bool(a > b),
        Ge => Value::bool(a >= b),
        _ => {
            return Err(AsmError::TypeMismatch(format!(
                "operator {:?} cannot be applied to strings",
                op
            )))
        }
    })
}

fn call(function: Function, argument: Value) -> AsmResult<Value> {
    let value = match (function, argument) {
        (_, Value::Unresolved) => return Ok(Value::Unresolved),
        (Function::Strlen, Value::Str(s)) => return Ok(Value::Integer(s.chars().count() as i64)),
        (Function::Strlen, Value::Integer(v)) => {
            return Err(AsmError::TypeMismatch(format!(
                "strlen expects a string, found {}",
                v
            )))
        }
        (_, Value::Str(s)) => {
            return Err(AsmError::TypeMismatch(format!(
                "{:?} expects a number, found \"{}\"",
                function, s
            )))
        }
        (_, Value::Integer(v)) => v,
    };

    Ok(Value::Integer(match function {
        Function::High => (value >> 8) & 0xFF,
        Function::Low => value & 0xFF,
        Function::Msw => (value >> 16) & 0xFFFF,
        Function::Lsw => value & 0xFFFF,
        Function::Strlen => unreachable!("handled above"),
    }))
}

/// Evaluate `text` against `resolver`.
pub fn evaluate(text: &str, resolver: &mut dyn Resolver) -> AsmResult<Value> {
    Evaluator::new(text, resolver)?.evaluate()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct Fixture {
        labels: HashMap<String, i64>,
        pc: i64,
        offset: i64,
        unresolved: usize,
        warnings: Vec<String>,
    }

    impl Resolver for Fixture {
        fn label_value(&mut self, name: &str) -> AsmResult<Option<i64>> {
            let value = self.labels.get(name).copied();
            if value.is_none() {
                self.unresolved += 1;
            }
            Ok(value)
        }

        fn run_pc(&self) -> i64 {
            self.pc + self.offset
        }

        fn storage_pc(&self) -> i64 {
            self.pc
        }

        fn warn(&mut self, message: &str) {
            self.warnings.push(message.to_owned());
        }
    }

    fn eval(text: &str) -> AsmResult<Value> {
        evaluate(text, &mut Fixture::default())
    }

    #[test]
    fn multiplication_binds_tighter() -> anyhow::Result<()> {
        assert_eq!(eval("3+4*2")?, Value::Integer(11));
        assert_eq!(eval("(3+4)*2")?, Value::Integer(14));
        assert_eq!(eval("10-3-2")?, Value::Integer(5));
        assert_eq!(eval("1 << 2 + 1")?, Value::Integer(8));
        assert_eq!(eval("1 | 2 ^ 3 & 6")?, Value::Integer(1 | (2 ^ (3 & 6))));
        assert_eq!(eval("2 < 3 == 1")?, Value::Integer(1));
        assert_eq!(eval("0 || 2 && 3")?, Value::Integer(1));
        Ok(())
    }

    #[test]
    fn percent_after_an_operand_is_modulo() -> anyhow::Result<()> {
        assert_eq!(eval("1%1")?, Value::Integer(0));
        assert_eq!(eval("7 % %11")?, Value::Integer(1));
        assert_eq!(eval("%101")?, Value::Integer(5));
        Ok(())
    }

    #[test]
    fn number_spellings() -> anyhow::Result<()> {
        for text in ["0x1F", "$1F", "1Fh", "0b11111", "11111b", "0o37", "37o", "37q", "31"] {
            assert_eq!(eval(text)?, Value::Integer(31), "{}", text);
        }
        assert_eq!(eval("'A'")?, Value::Integer(65));
        assert_eq!(eval("'\\n'")?, Value::Integer(10));
        assert!(eval("12ab").is_err());
        Ok(())
    }

    #[test]
    fn literals_decode_escapes_and_separators() -> anyhow::Result<()> {
        assert_eq!(eval("1_000")?, Value::Integer(1000));
        assert_eq!(eval("0xFF_FF")?, Value::Integer(0xFFFF));
        assert_eq!(eval("$ff + 1")?, Value::Integer(0x100));
        assert_eq!(eval(r#""a\x41\t\"""#)?, Value::Str("aA\t\"".into()));
        assert_eq!(eval(r"'\''")?, Value::Integer(39));
        assert_eq!(eval(r#""a;b,c""#)?, Value::Str("a;b,c".into()));
        Ok(())
    }

    #[test]
    fn lexer_errors_name_the_problem() {
        let syntax = |text: &str| match eval(text) {
            Err(AsmError::Syntax(message)) => message,
            other => panic!("{}: {:?}", text, other),
        };
        assert_eq!(syntax("$1g"), "malformed number $1g");
        assert_eq!(syntax("0x"), "malformed number 0x");
        assert_eq!(syntax(r#""a\q""#), r"unknown escape \q");
        assert_eq!(syntax(r#""\xZZ""#), r"bad escape \xZZ");
        assert_eq!(syntax("'ab'"), "character literal must hold one character: 'ab'");
        assert_eq!(syntax("'open"), "unterminated string");
        assert_eq!(syntax("1 # 2"), "unexpected character #");
        assert!(matches!(eval("0x1_0000_0000_0000_0000"), Err(AsmError::Range(_))));
    }

    #[test]
    fn standalone_numbers() -> anyhow::Result<()> {
        assert_eq!(parse_number("0b1010")?, 10);
        assert_eq!(parse_number("0Ah")?, 10);
        assert!(parse_number("10 ").is_err());
        assert!(parse_number("ten").is_err());
        Ok(())
    }

    #[test]
    fn unary_operators() -> anyhow::Result<()> {
        assert_eq!(eval("-5 + +2")?, Value::Integer(-3));
        assert_eq!(eval("!0")?, Value::Integer(1));
        assert_eq!(eval("!7")?, Value::Integer(0));
        assert_eq!(eval("~0")?, Value::Integer(-1));
        assert_eq!(eval("--1")?, Value::Integer(1));
        Ok(())
    }

    #[test]
    fn functions() -> anyhow::Result<()> {
        assert_eq!(eval("strlen(\"abc\")")?, Value::Integer(3));
        assert_eq!(eval("HIGH(0x1234)")?, Value::Integer(0x12));
        assert_eq!(eval("low(0x1234)")?, Value::Integer(0x34));
        assert_eq!(eval("msw(0x12345678)")?, Value::Integer(0x1234));
        assert_eq!(eval("lsw(0x12345678)")?, Value::Integer(0x5678));
        assert!(matches!(eval("strlen(5)"), Err(AsmError::TypeMismatch(_))));
        assert!(matches!(eval("high(\"x\")"), Err(AsmError::TypeMismatch(_))));
        Ok(())
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(eval("1/0"), Err(AsmError::DivideByZero));
        assert_eq!(eval("5 % (2-2)"), Err(AsmError::DivideByZero));
        assert_eq!(eval("missing / 0"), Err(AsmError::DivideByZero));
    }

    #[test]
    fn unknown_label_is_unresolved_until_defined() -> anyhow::Result<()> {
        let mut fixture = Fixture::default();
        assert_eq!(evaluate("later + 1", &mut fixture)?, Value::Unresolved);
        assert_eq!(fixture.unresolved, 1);

        fixture.labels.insert("later".into(), 41);
        assert_eq!(evaluate("later + 1", &mut fixture)?, Value::Integer(42));
        assert_eq!(fixture.unresolved, 1);
        Ok(())
    }

    #[test]
    fn unresolved_strlen_is_not_an_error() -> anyhow::Result<()> {
        assert_eq!(eval("strlen(nothing)")?, Value::Unresolved);
        Ok(())
    }

    #[test]
    fn strings_only_mix_with_strings() -> anyhow::Result<()> {
        assert_eq!(eval("\"ab\" + \"cd\"")?, Value::Str("abcd".into()));
        assert_eq!(eval("\"ab\" == \"ab\"")?, Value::Integer(1));
        assert_eq!(eval("\"ab\" < \"b\"")?, Value::Integer(1));
        assert!(matches!(eval("\"ab\" + 1"), Err(AsmError::TypeMismatch(_))));
        assert!(matches!(eval("\"ab\" * \"cd\""), Err(AsmError::TypeMismatch(_))));
        assert!(matches!(eval("-\"ab\""), Err(AsmError::TypeMismatch(_))));
        Ok(())
    }

    #[test]
    fn negative_shift_warns() -> anyhow::Result<()> {
        let mut fixture = Fixture::default();
        assert_eq!(
            evaluate("1 << -63", &mut fixture)?,
            Value::Integer(1i64.wrapping_shl(-63i64 as u32))
        );
        assert_eq!(fixture.warnings.len(), 1);
        Ok(())
    }

    #[test]
    fn program_counters() -> anyhow::Result<()> {
        let mut fixture = Fixture {
            pc: 0x100,
            offset: 0x1000,
            ..Fixture::default()
        };
        assert_eq!(evaluate("$", &mut fixture)?, Value::Integer(0x1100));
        assert_eq!(evaluate("$$", &mut fixture)?, Value::Integer(0x100));
        assert_eq!(evaluate("$+2", &mut fixture)?, Value::Integer(0x1102));
        Ok(())
    }

    #[test]
    fn malformed_expressions() {
        assert!(matches!(eval(""), Err(AsmError::Syntax(_))));
        assert!(matches!(eval("(1+2"), Err(AsmError::Syntax(_))));
        assert!(matches!(eval("1 2"), Err(AsmError::Syntax(_))));
        assert!(matches!(eval("1 +"), Err(AsmError::Syntax(_))));
        assert!(matches!(eval("\"open"), Err(AsmError::Syntax(_))));
    }
}
