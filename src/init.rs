//! Análisis de inicialización antes de uso.
//!
//! Recorre el árbol en profundidad con el conjunto de nombres que han
//! sido asignados en todo camino de control que llega al punto actual.
//! Este análisis no requiere información de tipos.
//!
//! - Las sentencias en secuencia propagan el mismo conjunto.
//! - Cada rama de un `if` trabaja sobre una copia; tras el `if` solo
//!   quedan los nombres inicializados en ambas ramas.
//! - El cuerpo de un `while` trabaja sobre una copia que se descarta,
//!   ya que el ciclo podría no ejecutarse.
//! - Una asignación agrega su destino después de analizar su valor.
//! - Los campos de `this` se rastrean aparte. Los métodos parten de los
//!   campos que el constructor inicializa en todo camino que termina,
//!   sea al final del cuerpo o en un `return`.

use std::{collections::HashSet, mem};
use thiserror::Error;

use crate::{
    ast::{Expr, ExprKind, Formal, Identifier, Program, Statement, Target},
    source::{Located, Location},
};

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("Variable `{0}` may be used before it is initialized")]
    UseBeforeInit(Identifier),

    #[error("Field `this.{0}` may be used before it is initialized")]
    FieldBeforeInit(Identifier),
}

type Init<T> = Result<T, Located<InitError>>;

/// Verifica una unidad completa.
///
/// Con `collect` se reportan todos los usos sin inicializar de la
/// unidad; de lo contrario el análisis se detiene en el primero.
pub fn check(program: &Program, collect: bool) -> Result<(), Vec<Located<InitError>>> {
    log::debug!("checking initialization before use");

    let mut analyzer = Analyzer {
        collect,
        errors: Vec::new(),
        exits: Flow(None),
    };

    if let Err(error) = analyzer.program(program) {
        analyzer.errors.push(error);
    }

    if analyzer.errors.is_empty() {
        Ok(())
    } else {
        Err(analyzer.errors)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Local(Identifier),
    Field(Identifier),
}

/// Nombres definitivamente inicializados. `None` marca código
/// inalcanzable, el cual se comporta como el conjunto universal.
#[derive(Clone)]
struct Flow(Option<HashSet<Slot>>);

impl Flow {
    fn entry(formals: &[Formal]) -> Self {
        let slots = formals
            .iter()
            .map(|formal| Slot::Local(formal.name.as_ref().clone()))
            .collect();

        Flow(Some(slots))
    }

    fn contains(&self, slot: &Slot) -> bool {
        match &self.0 {
            Some(slots) => slots.contains(slot),
            None => true,
        }
    }

    fn insert(&mut self, slot: Slot) {
        if let Some(slots) = &mut self.0 {
            slots.insert(slot);
        }
    }

    fn join(self, other: Flow) -> Flow {
        match (self.0, other.0) {
            (None, flow) | (flow, None) => Flow(flow),
            (Some(left), Some(right)) => Flow(Some(left.intersection(&right).cloned().collect())),
        }
    }

    fn fields(&self) -> Vec<Slot> {
        self.0
            .iter()
            .flatten()
            .filter(|slot| matches!(slot, Slot::Field(_)))
            .cloned()
            .collect()
    }
}

struct Analyzer {
    collect: bool,
    errors: Vec<Located<InitError>>,

    /// Unión de los flujos que salen por `return` en el miembro actual.
    exits: Flow,
}

impl Analyzer {
    fn program(&mut self, program: &Program) -> Init<()> {
        for class in &program.classes {
            self.exits = Flow(None);

            let mut flow = Flow::entry(&class.signature.formals);
            self.block(&class.body.statements, &mut flow)?;

            let exits = mem::replace(&mut self.exits, Flow(None));
            let fields = flow.join(exits).fields();
            for method in &class.body.methods {
                let mut flow = Flow::entry(&method.formals);
                for field in fields.iter().cloned() {
                    flow.insert(field);
                }

                self.block(&method.body, &mut flow)?;
            }
        }

        let mut flow = Flow::entry(&[]);
        self.block(&program.statements, &mut flow)
    }

    fn block(&mut self, statements: &[Statement], flow: &mut Flow) -> Init<()> {
        statements
            .iter()
            .try_for_each(|statement| self.statement(statement, flow))
    }

    fn statement(&mut self, statement: &Statement, flow: &mut Flow) -> Init<()> {
        match statement {
            Statement::Assignment { target, value, .. } => {
                self.expr(value, flow)?;
                flow.insert(match target.as_ref() {
                    Target::Local(name) => Slot::Local(name.clone()),
                    Target::Field(field) => Slot::Field(field.clone()),
                });
            }

            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                self.expr(condition, flow)?;

                let mut then_flow = flow.clone();
                self.block(then, &mut then_flow)?;

                let mut else_flow = flow.clone();
                if let Some(otherwise) = otherwise {
                    self.block(otherwise, &mut else_flow)?;
                }

                *flow = then_flow.join(else_flow);
            }

            Statement::While { condition, body } => {
                self.expr(condition, flow)?;

                // El ciclo podría no ejecutarse
                let mut body_flow = flow.clone();
                self.block(body, &mut body_flow)?;
            }

            Statement::Return(value) => {
                if let Some(value) = value.as_ref() {
                    self.expr(value, flow)?;
                }

                let exit = mem::replace(flow, Flow(None));
                self.exits = mem::replace(&mut self.exits, Flow(None)).join(exit);
            }

            Statement::Unused(expr) => self.expr(expr, flow)?,
        }

        Ok(())
    }

    fn expr(&mut self, expr: &Expr, flow: &Flow) -> Init<()> {
        use ExprKind::*;

        match &expr.kind {
            Int(_) | Str(_) | Bool(_) | Nothing | This => Ok(()),

            Var(name) => self.require(flow, Slot::Local(name.clone()), &expr.location),

            Field { receiver, field } => match receiver.kind {
                This => self.require(flow, Slot::Field(field.as_ref().clone()), field.location()),
                _ => self.expr(receiver, flow),
            },

            Unary(_, operand) => self.expr(operand, flow),

            Binary(left, _, right) | Compare(left, _, right) => {
                self.expr(left, flow)?;
                self.expr(right, flow)
            }

            Call { receiver, args, .. } => {
                self.expr(receiver, flow)?;
                args.iter().try_for_each(|arg| self.expr(arg, flow))
            }

            New { args, .. } => args.iter().try_for_each(|arg| self.expr(arg, flow)),
        }
    }

    fn require(&mut self, flow: &Flow, slot: Slot, location: &Location) -> Init<()> {
        if flow.contains(&slot) {
            return Ok(());
        }

        let error = match slot {
            Slot::Local(name) => InitError::UseBeforeInit(name),
            Slot::Field(field) => InitError::FieldBeforeInit(field),
        };

        let error = Located::at(error, location.clone());
        if self.collect {
            self.errors.push(error);
            Ok(())
        } else {
            Err(error)
        }
    }
}
