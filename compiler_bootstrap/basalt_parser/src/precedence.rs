//! Operator precedence handling

use crate::ast::BinOp;
use basalt_lexer::TokenKind;

/// Binding powers for binary operators, low to high. Assignment is handled
/// separately by the parser because it is right-associative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None = 0,
    Assignment = 1,     // =
    LogicOr = 2,        // ||
    LogicAnd = 3,       // &&
    BitOr = 4,          // |
    BitXor = 5,         // ^
    BitAnd = 6,         // &
    Equality = 7,       // == !=
    Comparison = 8,     // < > <= >=
    Shift = 9,          // << >>
    Term = 10,          // + -
    Factor = 11,        // * / %
}

/// The binary operator a token spells in infix position, if any.
pub fn binary_op(kind: TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::Eq => Some(BinOp::Assign),
        TokenKind::PipePipe => Some(BinOp::LogicOr),
        TokenKind::AmpAmp => Some(BinOp::LogicAnd),
        TokenKind::Pipe => Some(BinOp::Or),
        TokenKind::Caret => Some(BinOp::Xor),
        TokenKind::Amp => Some(BinOp::And),
        TokenKind::EqEq => Some(BinOp::Eq),
        TokenKind::BangEq => Some(BinOp::Ne),
        TokenKind::Lt => Some(BinOp::Lt),
        TokenKind::LtEq => Some(BinOp::Le),
        TokenKind::Gt => Some(BinOp::Gt),
        TokenKind::GtEq => Some(BinOp::Ge),
        TokenKind::LtLt => Some(BinOp::Shl),
        TokenKind::GtGt => Some(BinOp::Shr),
        TokenKind::Plus => Some(BinOp::Add),
        TokenKind::Minus => Some(BinOp::Sub),
        TokenKind::Star => Some(BinOp::Mul),
        TokenKind::Slash => Some(BinOp::Div),
        TokenKind::Percent => Some(BinOp::Mod),
        _ => None,
    }
}

/// The precedence level of a binary operator.
pub fn precedence(op: BinOp) -> Precedence {
    match op {
        BinOp::Assign => Precedence::Assignment,
        BinOp::LogicOr => Precedence::LogicOr,
        BinOp::LogicAnd => Precedence::LogicAnd,
        BinOp::Or => Precedence::BitOr,
        BinOp::Xor => Precedence::BitXor,
        BinOp::And => Precedence::BitAnd,
        BinOp::Eq | BinOp::Ne => Precedence::Equality,
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => Precedence::Comparison,
        BinOp::Shl | BinOp::Shr => Precedence::Shift,
        BinOp::Add | BinOp::Sub => Precedence::Term,
        BinOp::Mul | BinOp::Div | BinOp::Mod => Precedence::Factor,
    }
}
