use once_cell::sync::OnceCell;
use regex::Regex;

pub static LINE_REGEX: OnceCell<Regex> = OnceCell::new();
static LINE_REGEX_PATTERN: &str = r"^(?:(?P<label>[.@]?[A-Za-z_][A-Za-z0-9_]*)(?:(?P<colon>:)|\s+|$)|\s+(?P<indented>[.@]?[A-Za-z_][A-Za-z0-9_]*):)?\s*(?P<opcode>\S+)?\s*(?P<operands>.*?)\s*$";

pub fn line_regex() -> &'static Regex {
    LINE_REGEX.get_or_init(|| Regex::new(LINE_REGEX_PATTERN).expect("Invalid line regex"))
}

pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
