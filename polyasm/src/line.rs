use nom::{
    branch::alt,
    character::complete::{char, none_of},
    combinator::{all_consuming, opt, recognize, value},
    multi::{many0_count, separated_list1},
    sequence::tuple,
    IResult,
};

use crate::{
    constants::line_regex,
    directive::PseudoOp,
    error::{AsmError, AsmResult},
    expr::quoted,
};

/// A source line split into its three fields. Comments are already gone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLine {
    pub label: Option<String>,
    pub opcode: Option<String>,
    pub operands: String,
}

/// Cut a trailing `;` comment, leaving semicolons inside string and
/// character literals alone.
pub fn strip_comment(text: &str) -> &str {
    let code: IResult<&str, &str> =
        recognize(many0_count(alt((value((), quoted), value((), none_of(";\"'"))))))(text);
    match code {
        Ok((_, code)) => code,
        Err(_) => text,
    }
}

pub fn split_line(text: &str) -> SourceLine {
    let text = strip_comment(text);
    let Some(captures) = line_regex().captures(text) else {
        return SourceLine {
            opcode: Some(text.trim().to_owned()),
            ..SourceLine::default()
        };
    };

    let mut line = SourceLine {
        label: captures
            .name("label")
            .or_else(|| captures.name("indented"))
            .map(|m| m.as_str().to_owned()),
        opcode: captures.name("opcode").map(|m| m.as_str().to_owned()),
        operands: captures
            .name("operands")
            .map(|m| m.as_str().to_owned())
            .unwrap_or_default(),
    };

    // `endm` at column 0 is still the directive.
    if line.opcode.is_none() && captures.name("colon").is_none() {
        if let Some(label) = line.label.as_deref() {
            if PseudoOp::parse(label).is_some() {
                line.opcode = line.label.take();
            }
        }
    }

    // `  name equ 5` without a colon still names a constant.
    if line.label.is_none() {
        let (first, rest) = match line.operands.split_once(char::is_whitespace) {
            Some((first, rest)) => (first.to_owned(), rest.trim().to_owned()),
            None => (line.operands.clone(), String::new()),
        };
        if is_definition(&first) {
            line.label = line.opcode.take();
            line.opcode = Some(first);
            line.operands = rest;
        }
    }

    line
}

fn is_definition(word: &str) -> bool {
    word == "=" || word.eq_ignore_ascii_case("equ") || word.eq_ignore_ascii_case("set")
}

/// A parenthesised group; commas inside it do not split. A missing `)` is
/// tolerated and left for the expression parser to report.
fn group(i: &str) -> IResult<&str, ()> {
    value(
        (),
        tuple((
            char('('),
            many0_count(alt((value((), quoted), group, value((), none_of("()\"'"))))),
            opt(char(')')),
        )),
    )(i)
}

/// One operand, up to the next comma outside quotes and parentheses.
fn argument(i: &str) -> IResult<&str, &str> {
    recognize(many0_count(alt((
        value((), quoted),
        group,
        value((), none_of(",(\"'")),
    ))))(i)
}

/// Split at commas that are not inside quotes or parentheses.
pub fn split_args(text: &str) -> AsmResult<Vec<String>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let (_, args) = all_consuming(separated_list1(char(','), argument))(text)
        .map_err(|_| AsmError::syntax("unterminated string"))?;
    Ok(args.into_iter().map(|arg| arg.trim().to_owned()).collect())
}

/// The operand field of a line, as handed to processor plugins.
#[derive(Debug, Clone, Default)]
pub struct Operands {
    raw: String,
    items: Vec<String>,
    next: usize,
}

impl Operands {
    pub fn parse(text: &str) -> AsmResult<Self> {
        Ok(Self {
            raw: text.trim().to_owned(),
            items: split_args(text)?,
            next: 0,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(String::as_str)
    }

    /// Take the next operand, failing when there is none.
    pub fn next(&mut self) -> AsmResult<String> {
        let item = self
            .items
            .get(self.next)
            .cloned()
            .ok_or_else(|| AsmError::syntax("missing operand"))?;
        self.next += 1;
        Ok(item)
    }

    pub fn finish(&self) -> AsmResult<()> {
        if self.next < self.items.len() {
            Err(AsmError::syntax(format!(
                "unexpected operand {}",
                self.items[self.next]
            )))
        } else {
            Ok(())
        }
    }

    pub fn expect_count(&self, count: usize) -> AsmResult<()> {
        if self.items.len() == count {
            Ok(())
        } else {
            Err(AsmError::syntax(format!(
                "expected {} operand(s), found {}",
                count,
                self.items.len()
            )))
        }
    }
}
