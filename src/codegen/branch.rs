//! Evaluación de condiciones con cortocircuito.
//!
//! Una condición se compila como saltos en vez de como un valor. Cada
//! función recibe las dos etiquetas destino y continúa en la siguiente
//! instrucción cuando el resultado coincide con la rama implícita:
//! [`Generator::jump_if_true()`] continúa si la condición es falsa y
//! [`Generator::jump_if_false()`] continúa si es verdadera. Así, el
//! segundo operando de `||` nunca se evalúa si el primero es verdadero,
//! y el de `&&` nunca se evalúa si el primero es falso.

use super::{Codegen, Generator};
use crate::{
    ast::{CmpOp, Expr, ExprKind, UnOp},
    ir::{Const, Instruction, Label},
};

impl Generator<'_> {
    /// Salta a `on_true` si la condición es verdadera. `on_false` solo se
    /// usa como destino de saltos internos.
    pub(super) fn jump_if_true(&mut self, condition: &Expr, on_true: Label, on_false: Label) -> Codegen<()> {
        match &condition.kind {
            ExprKind::Compare(left, CmpOp::Or, right) => {
                let next = self.next("or", left);
                self.jump_if_true(left, on_true, next)?;
                self.place(left, next);
                self.jump_if_true(right, on_true, on_false)
            }

            ExprKind::Compare(left, CmpOp::And, right) => {
                let next = self.next("and", left);
                self.jump_if_false(left, on_false, next)?;
                self.place(left, next);
                self.jump_if_true(right, on_true, on_false)
            }

            ExprKind::Unary(UnOp::Not, operand) => self.jump_if_false(operand, on_true, on_false),

            _ => {
                self.expr(condition)?;
                self.emit(Instruction::JumpIf(on_true));
                Ok(())
            }
        }
    }

    /// Salta a `on_false` si la condición es falsa. `on_true` solo se
    /// usa como destino de saltos internos.
    pub(super) fn jump_if_false(&mut self, condition: &Expr, on_false: Label, on_true: Label) -> Codegen<()> {
        match &condition.kind {
            ExprKind::Compare(left, CmpOp::Or, right) => {
                let next = self.next("or", left);
                self.jump_if_true(left, on_true, next)?;
                self.place(left, next);
                self.jump_if_false(right, on_false, on_true)
            }

            ExprKind::Compare(left, CmpOp::And, right) => {
                let next = self.next("and", left);
                self.jump_if_false(left, on_false, next)?;
                self.place(left, next);
                self.jump_if_false(right, on_false, on_true)
            }

            ExprKind::Unary(UnOp::Not, operand) => self.jump_if_true(operand, on_false, on_true),

            _ => {
                self.expr(condition)?;
                self.emit(Instruction::JumpIfNot(on_false));
                Ok(())
            }
        }
    }

    /// Convierte una condición con cortocircuito en un valor `Bool`.
    pub(super) fn materialize(&mut self, condition: &Expr) -> Codegen<()> {
        let on_true = self.label("true");
        let on_false = self.label("false");
        let join = self.label("join");

        self.jump_if_true(condition, on_true, on_false)?;
        self.emit(Instruction::SetLabel(on_false));
        self.emit(Instruction::Const(Const::Bool(false)));
        self.emit(Instruction::Jump(join));
        self.emit(Instruction::SetLabel(on_true));
        self.emit(Instruction::Const(Const::Bool(true)));
        self.emit(Instruction::SetLabel(join));

        Ok(())
    }

    /// Etiqueta para el segundo operando. Un operando atómico nunca salta
    /// hacia ella, así que en ese caso no se consume numeración.
    fn next(&mut self, kind: &'static str, left: &Expr) -> Label {
        if is_branching(left) {
            self.label(kind)
        } else {
            Label::new(kind, u32::MAX)
        }
    }

    fn place(&mut self, left: &Expr, next: Label) {
        if is_branching(left) {
            self.emit(Instruction::SetLabel(next));
        }
    }
}

fn is_branching(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Compare(_, CmpOp::And, _)
            | ExprKind::Compare(_, CmpOp::Or, _)
            | ExprKind::Unary(UnOp::Not, _)
    )
}
