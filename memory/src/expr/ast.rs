//! Expression syntax trees.

/// A value position in an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Attribute name or `#placeholder`
    Path(String),
    /// `:placeholder`
    Value(String),
    /// `size(path)`
    Size(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    Between {
        value: Operand,
        low: Operand,
        high: Operand,
    },
    In {
        value: Operand,
        list: Vec<Operand>,
    },
    AttributeExists(String),
    AttributeNotExists(String),
    BeginsWith(Operand, Operand),
    Contains(Operand, Operand),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

/// Right-hand side term of a `SET` action.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOperand {
    Operand(Operand),
    IfNotExists(String, Operand),
    ListAppend(Box<SetOperand>, Box<SetOperand>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    Single(SetOperand),
    Plus(SetOperand, SetOperand),
    Minus(SetOperand, SetOperand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    Set { path: String, value: SetValue },
    Remove { path: String },
    Add { path: String, value: Operand },
}

/// A parsed update expression; actions in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub actions: Vec<UpdateAction>,
}
