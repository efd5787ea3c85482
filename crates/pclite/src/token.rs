//! Token kinds produced by the lexer.

use strum::{Display, EnumString};

/// Reserved words. Matched after an identifier has been fully assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
pub enum Keyword {
    #[strum(serialize = "fn")]
    Fn,
    #[strum(serialize = "let")]
    Let,
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "while")]
    While,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "as")]
    As,
    #[strum(serialize = "true")]
    True,
    #[strum(serialize = "false")]
    False,
    #[strum(serialize = "nan")]
    Nan,
    #[strum(serialize = "inf")]
    Inf,
    #[strum(serialize = "__LINE__")]
    Line,
    #[strum(serialize = "import")]
    Import,
    #[strum(serialize = "export")]
    Export,
    #[strum(serialize = "sizeof")]
    Sizeof,
}

/// Every punctuator and assignment-operator form in the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Punct {
    #[strum(serialize = "=")]
    Assign,
    #[strum(serialize = "&=")]
    AmpAssign,
    #[strum(serialize = "^=")]
    CaretAssign,
    #[strum(serialize = "|=")]
    PipeAssign,
    #[strum(serialize = "<<=")]
    ShlAssign,
    #[strum(serialize = ">>=")]
    ShrAssign,
    #[strum(serialize = ">>>=")]
    UShrAssign,
    #[strum(serialize = "+=")]
    PlusAssign,
    #[strum(serialize = "-=")]
    MinusAssign,
    #[strum(serialize = "*=")]
    StarAssign,
    #[strum(serialize = "/=")]
    SlashAssign,
    #[strum(serialize = "%=")]
    PercentAssign,
    #[strum(serialize = "&&")]
    AndAnd,
    #[strum(serialize = "||")]
    OrOr,
    #[strum(serialize = "&")]
    Amp,
    #[strum(serialize = "^")]
    Caret,
    #[strum(serialize = "|")]
    Pipe,
    #[strum(serialize = "==")]
    EqEq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = ">>>")]
    UShr,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Star,
    #[strum(serialize = "/")]
    Slash,
    #[strum(serialize = "%")]
    Percent,
    #[strum(serialize = "!")]
    Bang,
    #[strum(serialize = "~")]
    Tilde,
    #[strum(serialize = ".")]
    Dot,
    #[strum(serialize = "++")]
    PlusPlus,
    #[strum(serialize = "--")]
    MinusMinus,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ":")]
    Colon,
    #[strum(serialize = "(")]
    LParen,
    #[strum(serialize = ")")]
    RParen,
    #[strum(serialize = "[")]
    LBracket,
    #[strum(serialize = "]")]
    RBracket,
    #[strum(serialize = "{")]
    LBrace,
    #[strum(serialize = "}")]
    RBrace,
    /// `` ` `` — brackets an infix-invoke function name: `` x `f` y ``.
    #[strum(serialize = "`")]
    Backtick,
}

impl Punct {
    /// Longest-match punctuator table, tried in decreasing width order.
    pub const TABLE: &'static [(&'static str, Punct)] = &[
        (">>>=", Punct::UShrAssign),
        (">>>", Punct::UShr),
        ("<<=", Punct::ShlAssign),
        (">>=", Punct::ShrAssign),
        ("&&", Punct::AndAnd),
        ("||", Punct::OrOr),
        ("==", Punct::EqEq),
        ("!=", Punct::NotEq),
        ("<=", Punct::Le),
        (">=", Punct::Ge),
        ("<<", Punct::Shl),
        (">>", Punct::Shr),
        ("++", Punct::PlusPlus),
        ("--", Punct::MinusMinus),
        ("+=", Punct::PlusAssign),
        ("-=", Punct::MinusAssign),
        ("*=", Punct::StarAssign),
        ("/=", Punct::SlashAssign),
        ("%=", Punct::PercentAssign),
        ("&=", Punct::AmpAssign),
        ("^=", Punct::CaretAssign),
        ("|=", Punct::PipeAssign),
        ("=", Punct::Assign),
        ("&", Punct::Amp),
        ("^", Punct::Caret),
        ("|", Punct::Pipe),
        ("<", Punct::Lt),
        (">", Punct::Gt),
        ("+", Punct::Plus),
        ("-", Punct::Minus),
        ("*", Punct::Star),
        ("/", Punct::Slash),
        ("%", Punct::Percent),
        ("!", Punct::Bang),
        ("~", Punct::Tilde),
        (".", Punct::Dot),
        (",", Punct::Comma),
        (":", Punct::Colon),
        ("(", Punct::LParen),
        (")", Punct::RParen),
        ("[", Punct::LBracket),
        ("]", Punct::RBracket),
        ("{", Punct::LBrace),
        ("}", Punct::RBrace),
        ("`", Punct::Backtick),
    ];
}

/// Radix of an integer literal, preserved for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntRadix {
    Binary,
    Octal,
    Decimal,
    Hex,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Keyword(Keyword),
    Int { value: i64, radix: IntRadix },
    Float(f64),
    Char(char),
    Str(String),
    Punct(Punct),
    /// An explicit `;` or an inferred end-of-line.
    Linebreak,
    /// A token the lexer could not classify; carries the offending text.
    Invalid(String),
}

/// `{line, column, width, kind}` — `line`/`column` are 0-indexed, `width` is
/// the token's length in `char`s (not bytes).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub line: u32,
    pub column: u32,
    pub width: u32,
    pub kind: TokenKind,
}

impl Token {
    #[must_use]
    pub fn new(line: u32, column: u32, width: u32, kind: TokenKind) -> Self {
        Self { line, column, width, kind }
    }

    #[must_use]
    pub fn is_linebreak(&self) -> bool {
        matches!(self.kind, TokenKind::Linebreak)
    }
}
