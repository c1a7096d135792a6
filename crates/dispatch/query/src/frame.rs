//! Value stack sliced into frames.
//!
//! A frame is a contiguous run of values pushed together; arithmetic opcodes
//! combine the top two frames slot by slot. Operands reaching the arithmetic
//! paths are typed by the compiler, so a mismatch here is a broken chain and
//! fails loudly rather than returning an error.

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulus,
}

impl ArithmeticOp {
    pub fn apply(&self, x: f64, y: f64) -> f64 {
        match self {
            ArithmeticOp::Plus => x + y,
            ArithmeticOp::Minus => x - y,
            ArithmeticOp::Multiply => x * y,
            ArithmeticOp::Divide => x / y,
            ArithmeticOp::Modulus => x % y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StackFrame {
    base: usize,
    len: usize,
}

/// Growable value stack with frame boundaries.
#[derive(Debug, Default)]
pub struct ValueStack {
    values: Vec<Value>,
    frames: Vec<StackFrame>,
}

impl ValueStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame holding `values`.
    pub fn push_frame(&mut self, values: impl IntoIterator<Item = Value>) {
        let base = self.values.len();
        self.values.extend(values);
        self.frames.push(StackFrame {
            base,
            len: self.values.len() - base,
        });
    }

    pub fn push_value(&mut self, value: Value) {
        self.push_frame(std::iter::once(value));
    }

    /// Discard the top frame and return its values.
    pub fn pop_frame(&mut self) -> Option<Vec<Value>> {
        let frame = self.frames.pop()?;
        Some(self.values.split_off(frame.base))
    }

    /// Values of the top frame.
    pub fn top(&self) -> Option<&[Value]> {
        self.frames
            .last()
            .map(|f| &self.values[f.base..f.base + f.len])
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.frames.clear();
    }

    /// Combine the top frame `x` with the frame beneath it `y` as
    /// `y[i] = op(x[i], y[i])`, then discard `x`.
    ///
    /// # Panics
    ///
    /// Panics if fewer than two frames are present, if the frames differ in
    /// length, or if a slot does not hold a number.
    pub fn apply_binary(&mut self, op: ArithmeticOp) {
        assert!(
            self.frames.len() >= 2,
            "arithmetic needs two frames, stack has {}",
            self.frames.len()
        );
        let top = self.frames[self.frames.len() - 1];
        let second = self.frames[self.frames.len() - 2];
        assert_eq!(
            top.len, second.len,
            "arithmetic frames differ in length ({} vs {})",
            top.len, second.len
        );
        for i in 0..top.len {
            let x = number_at(&self.values, top.base + i);
            let y = number_at(&self.values, second.base + i);
            self.values[second.base + i] = Value::Number(op.apply(x, y));
        }
        self.frames.pop();
        self.values.truncate(top.base);
    }

    /// Negate every slot of the top frame in place.
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty or a slot does not hold a number.
    pub fn negate_top(&mut self) {
        let Some(&top) = self.frames.last() else {
            panic!("negate on an empty stack");
        };
        for i in top.base..top.base + top.len {
            let x = number_at(&self.values, i);
            self.values[i] = Value::Number(-x);
        }
    }
}

fn number_at(values: &[Value], index: usize) -> f64 {
    match &values[index] {
        Value::Number(n) => *n,
        other => panic!(
            "arithmetic operand at slot {} is {:?}, not a number",
            index,
            other.kind()
        ),
    }
}
