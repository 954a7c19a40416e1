//! Análisis semántico.
//!
//! # Descriptores de clase
//! [`declare()`] registra cada clase de la unidad, en orden de
//! declaración, junto a la firma de su constructor. La clase sintética
//! que contiene las sentencias de nivel superior se registra de última.
//!
//! # Verificación de tipos
//! [`check()`] asigna un tipo a cada expresión y valida operadores y
//! llamadas contra la tabla de clases. Los tipos de variables y campos
//! se infieren de sus asignaciones y se ensanchan al ancestro común
//! cuando dos asignaciones difieren.
//!
//! Una clase puede referirse a métodos o campos que se declaran después,
//! por lo cual una pasada completa puede no tener suficiente información.
//! Los juicios que dependen de información faltante se difieren en vez
//! de fallar, y la pasada se repite mientras descubra algo nuevo. Si una
//! pasada no progresa y aún hay juicios diferidos, el primero de ellos
//! se convierte en el error reportado.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::{
    ast::{CmpOp, Expr, ExprKind, Formal, Identifier, NodeId, Program, Statement, Target, UnOp},
    classes::{ClassError, ClassTable, Signature, BOOL, CONSTRUCTOR, INT, NOTHING, ROOT, STRING},
    scope::{Member, ScopeTable},
    source::{Located, Location},
};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error(transparent)]
    Class(#[from] ClassError),

    #[error("Field `{1}` is undefined for class `{0}`")]
    UnknownField(Identifier, Identifier),

    #[error("Type of `{0}` could not be inferred")]
    Untyped(Identifier),

    #[error("Type mismatch in {construct}: expected `{expected}`, found `{found}`")]
    OperandType {
        construct: String,
        expected: Identifier,
        found: Identifier,
    },

    #[error("Condition must be `Bool`, found `{0}`")]
    ConditionType(Identifier),

    #[error("Operator `{0}` requires `Bool` operands, found `{1}`")]
    NotBoolean(String, Identifier),

    #[error("`{class}:{method}` takes {expected} argument(s), {found} given")]
    Arity {
        class: Identifier,
        method: Identifier,
        expected: usize,
        found: usize,
    },

    #[error("Cannot assign `{found}` to `{variable}`, declared as `{declared}`")]
    DeclaredType {
        variable: Identifier,
        declared: Identifier,
        found: Identifier,
    },

    #[error("`{method}` must return `{expected}`, found `{found}`")]
    ReturnType {
        method: Identifier,
        expected: Identifier,
        found: Identifier,
    },
}

/// Tipos inferidos, indexados por nodo de expresión.
#[derive(Debug, Default)]
pub struct Types {
    exprs: HashMap<NodeId, Identifier>,
}

impl Types {
    pub fn of(&self, id: NodeId) -> Option<&Identifier> {
        self.exprs.get(&id)
    }

    fn record(&mut self, id: NodeId, typ: Identifier) {
        self.exprs.insert(id, typ);
    }
}

/// Estado mutable de una unidad de compilación.
///
/// Se construye uno nuevo por unidad; ninguna tabla se comparte entre
/// unidades distintas.
#[derive(Default)]
pub struct Tables {
    pub classes: ClassTable,
    pub scopes: ScopeTable,
    pub types: Types,
}

impl Tables {
    pub fn new() -> Self {
        Default::default()
    }
}

/// Registra los descriptores de clase de la unidad.
pub fn declare(
    program: &Program,
    tables: &mut Tables,
    main: &Identifier,
) -> Result<(), Located<ClassError>> {
    log::debug!("building class descriptors");

    let root = Identifier::new(ROOT);
    let mut declared = HashSet::new();

    for class in &program.classes {
        let name = &class.signature.name;
        let (superclass, location) = match &class.signature.superclass {
            Some(superclass) => (superclass.as_ref(), superclass.location()),
            None => (&root, name.location()),
        };

        if !declared.insert(name.as_ref().clone()) {
            let error = ClassError::DuplicateClass(name.as_ref().clone());
            return Err(Located::at(error, name.location().clone()));
        }

        tables
            .classes
            .register_class(name.as_ref(), superclass)
            .map_err(|error| Located::at(error, location.clone()))?;
    }

    tables
        .classes
        .register_class(main, &root)
        .map_err(|error| Located::at(error, Location::default()))?;

    tables
        .classes
        .add_method(main, &Identifier::new(CONSTRUCTOR), Vec::new(), main.clone())
        .map_err(|error| Located::at(error, Location::default()))?;

    // Los formales pueden referirse a clases declaradas más adelante
    for class in &program.classes {
        let name = class.signature.name.as_ref();
        let params = class
            .signature
            .formals
            .iter()
            .map(|formal| {
                let of = formal.of.as_ref();
                if tables.classes.contains(of.as_ref()) {
                    Ok(of.clone())
                } else {
                    let error = ClassError::UnknownClass(of.clone());
                    Err(Located::at(error, formal.of.location().clone()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        tables
            .classes
            .add_method(name, &Identifier::new(CONSTRUCTOR), params, name.clone())
            .map_err(|error| Located::at(error, class.signature.name.location().clone()))?;
    }

    Ok(())
}

/// Verifica e infiere tipos hasta alcanzar un punto fijo.
pub fn check(program: &Program, tables: &mut Tables, main: &Identifier) -> Semantic<()> {
    let mut pass = 1;
    loop {
        let mut context = Context {
            tables: &mut *tables,
            class: main.clone(),
            member: Member::Constructor,
            returns: main.clone(),
            progress: false,
            deferred: None,
        };

        context.program(program, main)?;

        let Context {
            progress, deferred, ..
        } = context;

        log::debug!("type checking pass {} done, progress: {}", pass, progress);

        match (progress, deferred) {
            (true, _) => pass += 1,
            (false, None) => return Ok(()),
            (false, Some(error)) => return Err(error),
        }
    }
}

struct Context<'t> {
    tables: &'t mut Tables,
    class: Identifier,
    member: Member,
    returns: Identifier,
    progress: bool,
    deferred: Option<Located<SemanticError>>,
}

/// Tipo de una expresión, o `None` si su juicio se difirió.
type Typed = Semantic<Option<Identifier>>;

impl Context<'_> {
    fn program(&mut self, program: &Program, main: &Identifier) -> Semantic<()> {
        for class in &program.classes {
            let name = class.signature.name.as_ref();
            let changed = self
                .tables
                .classes
                .inherit(name)
                .map_err(|error| located(error, class.signature.name.location()))?;

            self.progress |= changed;

            let formals = self.formals(&class.signature.formals)?;
            self.enter(name, Member::Constructor, name, &formals);
            self.block(&class.body.statements)?;

            for method in &class.body.methods {
                let formals = self.formals(&method.formals)?;
                let returns = self.class_name(&method.returns)?;
                let params = formals.iter().map(|(_, typ)| typ.clone()).collect();

                let changed = self
                    .tables
                    .classes
                    .add_method(name, method.name.as_ref(), params, returns.clone())
                    .map_err(|error| located(error, method.name.location()))?;

                self.progress |= changed;

                let member = Member::Method(method.name.as_ref().clone());
                self.enter(name, member, &returns, &formals);
                self.block(&method.body)?;
            }
        }

        self.enter(main, Member::Constructor, main, &[]);
        self.block(&program.statements)
    }

    fn enter(
        &mut self,
        class: &Identifier,
        member: Member,
        returns: &Identifier,
        formals: &[(Identifier, Identifier)],
    ) {
        self.tables.scopes.set_formals(class, &member, formals);

        self.class = class.clone();
        self.member = member;
        self.returns = returns.clone();
    }

    fn formals(&self, formals: &[Formal]) -> Semantic<Vec<(Identifier, Identifier)>> {
        formals
            .iter()
            .map(|formal| Ok((formal.name.as_ref().clone(), self.class_name(&formal.of)?)))
            .collect()
    }

    fn class_name(&self, name: &Located<Identifier>) -> Semantic<Identifier> {
        if self.tables.classes.contains(name.as_ref().as_ref()) {
            Ok(name.as_ref().clone())
        } else {
            let error = ClassError::UnknownClass(name.as_ref().clone());
            Err(located(error, name.location()))
        }
    }

    fn block(&mut self, statements: &[Statement]) -> Semantic<()> {
        statements
            .iter()
            .try_for_each(|statement| self.statement(statement))
    }

    fn statement(&mut self, statement: &Statement) -> Semantic<()> {
        match statement {
            Statement::Assignment {
                target,
                declared,
                value,
            } => {
                let found = self.expr(value)?;
                let declared = match declared {
                    Some(declared) => Some(self.class_name(declared)?),
                    None => None,
                };

                // Un parámetro formal conserva su tipo declarado
                let formal = match target.as_ref() {
                    Target::Local(name) => self
                        .tables
                        .scopes
                        .frame(&self.class, &self.member)
                        .and_then(|frame| frame.formal(name.as_ref()))
                        .cloned(),

                    Target::Field(_) => None,
                };

                // El valor contra el tipo anotado, y lo asignado contra el formal
                let checks = [
                    (declared.as_ref(), found.as_ref()),
                    (formal.as_ref(), declared.as_ref().or(found.as_ref())),
                ];

                for (bound, assigned) in checks {
                    if let (Some(bound), Some(assigned)) = (bound, assigned) {
                        if !self.tables.classes.is_subclass(assigned, bound) {
                            let variable = match target.as_ref() {
                                Target::Local(name) => name.clone(),
                                Target::Field(field) => Identifier::new(&format!("this.{}", field)),
                            };

                            let error = SemanticError::DeclaredType {
                                variable,
                                declared: bound.clone(),
                                found: assigned.clone(),
                            };

                            return Err(located(error, &value.location));
                        }
                    }
                }

                let typ = declared.or(found);
                match target.as_ref() {
                    Target::Local(_) if formal.is_some() => {}
                    Target::Local(name) => self.assign_local(name, typ.as_ref()),
                    Target::Field(field) => self.assign_field(field, typ.as_ref(), target.location())?,
                }
            }

            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                self.condition(condition)?;
                self.block(then)?;

                if let Some(otherwise) = otherwise {
                    self.block(otherwise)?;
                }
            }

            Statement::While { condition, body } => {
                self.condition(condition)?;
                self.block(body)?;
            }

            Statement::Return(value) => self.ret(value)?,

            Statement::Unused(expr) => {
                self.expr(expr)?;
            }
        }

        Ok(())
    }

    fn assign_local(&mut self, name: &Identifier, typ: Option<&Identifier>) {
        let Tables {
            classes, scopes, ..
        } = &mut *self.tables;

        scopes.declare_local(&self.class, &self.member, name);
        if let Some(typ) = typ {
            self.progress |= scopes.widen_local(classes, &self.class, &self.member, name, typ);
        }
    }

    fn assign_field(
        &mut self,
        field: &Identifier,
        typ: Option<&Identifier>,
        location: &Location,
    ) -> Semantic<()> {
        // Los campos nacen en el constructor
        if self.member == Member::Constructor {
            let added = self
                .tables
                .classes
                .add_field(&self.class, field)
                .map_err(|error| located(error, location))?;

            self.progress |= added;
        } else {
            let known = self
                .tables
                .classes
                .get(&self.class)
                .map_err(|error| located(error, location))?
                .has_field(field.as_ref());

            if !known {
                let error = SemanticError::UnknownField(self.class.clone(), field.clone());
                self.defer(error, location);
                return Ok(());
            }
        }

        if let Some(typ) = typ {
            let Tables {
                classes, scopes, ..
            } = &mut *self.tables;

            self.progress |= scopes.widen_field(classes, &self.class, field, typ);
        }

        Ok(())
    }

    fn condition(&mut self, condition: &Expr) -> Semantic<()> {
        match self.expr(condition)? {
            Some(typ) if typ.as_ref() != BOOL => {
                Err(located(SemanticError::ConditionType(typ), &condition.location))
            }

            _ => Ok(()),
        }
    }

    fn ret(&mut self, value: &Located<Option<Expr>>) -> Semantic<()> {
        let found = match value.as_ref() {
            Some(value) => self.expr(value)?,

            // Un constructor siempre retorna su receptor
            None if self.member == Member::Constructor => return Ok(()),
            None => Some(Identifier::new(NOTHING)),
        };

        match found {
            Some(found) if !self.tables.classes.is_subclass(&found, &self.returns) => {
                let method = match &self.member {
                    Member::Constructor => Identifier::new(CONSTRUCTOR),
                    Member::Method(method) => method.clone(),
                };

                let error = SemanticError::ReturnType {
                    method,
                    expected: self.returns.clone(),
                    found,
                };

                Err(located(error, value.location()))
            }

            _ => Ok(()),
        }
    }

    fn expr(&mut self, expr: &Expr) -> Typed {
        use ExprKind::*;

        let location = &expr.location;
        let typ = match &expr.kind {
            Int(_) => Some(Identifier::new(INT)),
            Str(_) => Some(Identifier::new(STRING)),
            Bool(_) => Some(Identifier::new(BOOL)),
            Nothing => Some(Identifier::new(NOTHING)),
            This => Some(self.class.clone()),

            Var(name) => {
                let scopes = &self.tables.scopes;
                match scopes.local_type(&self.class, &self.member, name.as_ref()).cloned() {
                    Some(typ) => Some(typ),
                    None => self.defer(SemanticError::Untyped(name.clone()), location),
                }
            }

            Field { receiver, field } => match self.expr(receiver)? {
                None => None,
                Some(class) => {
                    let Tables { classes, scopes, .. } = &*self.tables;
                    let found = scopes.field_type(classes, &class, field.as_ref().as_ref()).cloned();

                    match found {
                        Some(typ) => Some(typ),
                        None => {
                            let error = SemanticError::UnknownField(class, field.as_ref().clone());
                            self.defer(error, field.location())
                        }
                    }
                }
            },

            Unary(op, operand) => match (op, self.expr(operand)?) {
                (_, None) => None,

                (UnOp::Not, Some(typ)) if typ.as_ref() != BOOL => {
                    let error = SemanticError::NotBoolean(op.to_string(), typ);
                    return Err(located(error, location));
                }

                (UnOp::Not, Some(typ)) => Some(typ),

                (UnOp::Neg, Some(typ)) => {
                    self.lookup(&typ, &Identifier::new("negate"), location)?;
                    Some(typ)
                }
            },

            Binary(left, op, right) => {
                let left_type = self.expr(left)?;
                let right_type = self.expr(right)?;

                match left_type {
                    None => None,
                    Some(left_type) => {
                        let method = Identifier::new(op.method());
                        match self.lookup(&left_type, &method, location)? {
                            None => None,
                            Some(signature) => {
                                let construct = format!("operator `{}`", op);
                                self.operand(&signature, right_type, construct, &right.location)?;
                                Some(signature.returns)
                            }
                        }
                    }
                }
            }

            Compare(left, op, right) => {
                let left_type = self.expr(left)?;
                let right_type = self.expr(right)?;
                self.compare(*op, left_type, right_type, &right.location, location)?;

                Some(Identifier::new(BOOL))
            }

            Call {
                receiver,
                method,
                args,
            } => {
                let receiver_type = self.expr(receiver)?;
                let arg_types = self.exprs(args)?;

                match receiver_type {
                    None => None,
                    Some(class) => match self.lookup(&class, method.as_ref(), method.location())? {
                        None => None,
                        Some(signature) => {
                            self.arguments(&class, method.as_ref(), &signature, &arg_types, args, location)?;
                            Some(signature.returns)
                        }
                    },
                }
            }

            New { class, args } => {
                let class_type = self.class_name(class)?;
                let arg_types = self.exprs(args)?;
                let constructor = Identifier::new(CONSTRUCTOR);

                if let Some(signature) = self.lookup(&class_type, &constructor, class.location())? {
                    self.arguments(&class_type, &constructor, &signature, &arg_types, args, location)?;
                }

                Some(class_type)
            }
        };

        if let Some(typ) = &typ {
            self.tables.types.record(expr.id, typ.clone());
        }

        Ok(typ)
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Semantic<Vec<Option<Identifier>>> {
        exprs.iter().map(|expr| self.expr(expr)).collect()
    }

    fn compare(
        &mut self,
        op: CmpOp,
        left: Option<Identifier>,
        right: Option<Identifier>,
        right_location: &Location,
        location: &Location,
    ) -> Semantic<()> {
        match op.method() {
            None => {
                let bad = [&left, &right]
                    .into_iter()
                    .flatten()
                    .find(|typ| typ.as_ref() != BOOL);

                match bad {
                    Some(typ) => {
                        let error = SemanticError::NotBoolean(op.to_string(), typ.clone());
                        Err(located(error, location))
                    }

                    None => Ok(()),
                }
            }

            Some(method) => {
                let left = match left {
                    Some(left) => left,
                    None => return Ok(()),
                };

                if let Some(signature) = self.lookup(&left, &Identifier::new(method), location)? {
                    let construct = format!("operator `{}`", op);
                    self.operand(&signature, right, construct, right_location)?;
                }

                Ok(())
            }
        }
    }

    /// Busca un método. Un método desconocido difiere el juicio, ya que
    /// podría registrarse más adelante en la misma pasada o en otra.
    fn lookup(
        &mut self,
        class: &Identifier,
        method: &Identifier,
        location: &Location,
    ) -> Semantic<Option<Signature>> {
        let found = self.tables.classes.lookup_signature(class, method).cloned();
        match found {
            Ok(signature) => Ok(Some(signature)),
            Err(error @ ClassError::UnknownMethod(..)) => {
                self.defer(error.into(), location);
                Ok(None)
            }

            Err(error) => Err(located(error, location)),
        }
    }

    /// Verifica el operando derecho contra el parámetro del método del operador.
    fn operand(
        &self,
        signature: &Signature,
        found: Option<Identifier>,
        construct: String,
        location: &Location,
    ) -> Semantic<()> {
        match (signature.params.first(), found) {
            (Some(expected), Some(found)) if !self.tables.classes.is_subclass(&found, expected) => {
                let error = SemanticError::OperandType {
                    construct,
                    expected: expected.clone(),
                    found,
                };

                Err(located(error, location))
            }

            _ => Ok(()),
        }
    }

    /// Verifica argumentos posicionalmente. Una lista de parámetros vacía
    /// significa que el método no se verifica.
    fn arguments(
        &self,
        class: &Identifier,
        method: &Identifier,
        signature: &Signature,
        found: &[Option<Identifier>],
        args: &[Expr],
        location: &Location,
    ) -> Semantic<()> {
        if signature.params.is_empty() {
            return Ok(());
        }

        if signature.params.len() != found.len() {
            let error = SemanticError::Arity {
                class: class.clone(),
                method: method.clone(),
                expected: signature.params.len(),
                found: found.len(),
            };

            return Err(located(error, location));
        }

        let triples = signature.params.iter().zip(found).zip(args).enumerate();
        for (index, ((expected, found), arg)) in triples {
            if let Some(found) = found {
                if !self.tables.classes.is_subclass(found, expected) {
                    let error = SemanticError::OperandType {
                        construct: format!("argument {} of `{}:{}`", index + 1, class, method),
                        expected: expected.clone(),
                        found: found.clone(),
                    };

                    return Err(located(error, &arg.location));
                }
            }
        }

        Ok(())
    }

    fn defer(&mut self, error: SemanticError, location: &Location) -> Option<Identifier> {
        if self.deferred.is_none() {
            log::trace!("deferred: {}", error);
            self.deferred = Some(located(error, location));
        }

        None
    }
}

fn located<E: Into<SemanticError>>(error: E, location: &Location) -> Located<SemanticError> {
    Located::at(error.into(), location.clone())
}
