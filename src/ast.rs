//! Árbol sintáctico de entrada.
//!
//! El árbol lo construye un front end externo (lexer y parser) por medio
//! de [`Builder`], el cual asigna un [`NodeId`] único a cada expresión.
//! Las fases de este núcleo nunca modifican el árbol: los tipos que
//! infiere el verificador se registran en una tabla aparte indexada por
//! estos identificadores.

use std::{
    borrow::Borrow,
    cell::{Cell, RefCell},
    fmt::{self, Display},
    rc::Rc,
};

use crate::source::{Located, Location};

/// Nombre del receptor implícito en código fuente.
pub const THIS: &str = "this";

/// Un identificador de variable, campo, método o clase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl Identifier {
    pub fn new(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier::new(name)
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Identidad de un nodo de expresión.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// Una unidad de compilación: clases en orden de declaración seguidas
/// de las sentencias de nivel superior.
#[derive(Debug)]
pub struct Program {
    pub classes: Vec<Class>,
    pub statements: Vec<Statement>,
}

#[derive(Debug)]
pub struct Class {
    pub signature: Signature,
    pub body: Body,
}

/// Encabezado de clase. Los parámetros formales son los del constructor.
#[derive(Debug)]
pub struct Signature {
    pub name: Located<Identifier>,
    pub superclass: Option<Located<Identifier>>,
    pub formals: Vec<Formal>,
}

/// Cuerpo de clase: sentencias del constructor y métodos.
#[derive(Debug)]
pub struct Body {
    pub statements: Vec<Statement>,
    pub methods: Vec<Method>,
}

#[derive(Debug)]
pub struct Method {
    pub name: Located<Identifier>,
    pub formals: Vec<Formal>,
    pub returns: Located<Identifier>,
    pub body: Vec<Statement>,
}

#[derive(Debug)]
pub struct Formal {
    pub name: Located<Identifier>,
    pub of: Located<Identifier>,
}

#[derive(Debug)]
pub enum Statement {
    Assignment {
        target: Located<Target>,
        declared: Option<Located<Identifier>>,
        value: Expr,
    },

    If {
        condition: Expr,
        then: Vec<Statement>,
        otherwise: Option<Vec<Statement>>,
    },

    While {
        condition: Expr,
        body: Vec<Statement>,
    },

    Return(Located<Option<Expr>>),

    /// Expresión evaluada solo por sus efectos.
    Unused(Expr),
}

/// Lado izquierdo de una asignación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Variable local o parámetro.
    Local(Identifier),

    /// Campo del receptor implícito (`this.x`).
    Field(Identifier),
}

#[derive(Debug)]
pub struct Expr {
    pub id: NodeId,
    pub location: Location,
    pub kind: ExprKind,
}

#[derive(Debug)]
pub enum ExprKind {
    Int(i32),
    Str(String),
    Bool(bool),
    Nothing,
    Var(Identifier),
    This,

    Field {
        receiver: Box<Expr>,
        field: Located<Identifier>,
    },

    Unary(UnOp, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),

    Call {
        receiver: Box<Expr>,
        method: Located<Identifier>,
        args: Vec<Expr>,
    },

    New {
        class: Located<Identifier>,
        args: Vec<Expr>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    /// Método que implementa al operador en la clase del operando izquierdo.
    pub fn method(self) -> &'static str {
        match self {
            BinOp::Add => "plus",
            BinOp::Sub => "minus",
            BinOp::Mul => "times",
            BinOp::Div => "divide",
        }
    }
}

/// Comparaciones relacionales, de igualdad y booleanas de cortocircuito.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl CmpOp {
    /// Método contra el cual se verifica el operador en la clase del
    /// operando izquierdo. Los operadores booleanos no despachan.
    pub fn method(self) -> Option<&'static str> {
        match self {
            CmpOp::Equal | CmpOp::NotEqual => Some("equals"),
            CmpOp::Less => Some("less"),
            CmpOp::LessOrEqual => Some("less_eq"),
            CmpOp::Greater => Some("greater"),
            CmpOp::GreaterOrEqual => Some("greater_eq"),
            CmpOp::And | CmpOp::Or => None,
        }
    }
}

impl Display for UnOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            UnOp::Not => "!",
            UnOp::Neg => "-",
        })
    }
}

impl Display for BinOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        })
    }
}

impl Display for CmpOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            CmpOp::Equal => "==",
            CmpOp::NotEqual => "!=",
            CmpOp::Less => "<",
            CmpOp::LessOrEqual => "<=",
            CmpOp::Greater => ">",
            CmpOp::GreaterOrEqual => ">=",
            CmpOp::And => "&&",
            CmpOp::Or => "||",
        })
    }
}

/// Constructor de árboles para el front end.
///
/// Cada expresión recibe un [`NodeId`] nuevo y la ubicación actual,
/// la cual se ajusta con [`Builder::locate()`] conforme el parser
/// avanza. Todos los métodos toman `&self` para permitir construcción
/// anidada en una misma expresión.
#[derive(Default)]
pub struct Builder {
    next_id: Cell<u32>,
    location: RefCell<Location>,
}

impl Builder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Fija la ubicación de los nodos que se construyan a continuación.
    pub fn locate(&self, location: Location) {
        *self.location.borrow_mut() = location;
    }

    pub fn program(&self, classes: Vec<Class>, statements: Vec<Statement>) -> Program {
        Program {
            classes,
            statements,
        }
    }

    pub fn class(
        &self,
        name: &str,
        superclass: Option<&str>,
        formals: Vec<Formal>,
        statements: Vec<Statement>,
        methods: Vec<Method>,
    ) -> Class {
        Class {
            signature: Signature {
                name: self.id(name),
                superclass: superclass.map(|superclass| self.id(superclass)),
                formals,
            },
            body: Body {
                statements,
                methods,
            },
        }
    }

    pub fn method(
        &self,
        name: &str,
        formals: Vec<Formal>,
        returns: &str,
        body: Vec<Statement>,
    ) -> Method {
        Method {
            name: self.id(name),
            formals,
            returns: self.id(returns),
            body,
        }
    }

    pub fn formal(&self, name: &str, of: &str) -> Formal {
        Formal {
            name: self.id(name),
            of: self.id(of),
        }
    }

    pub fn assign(&self, name: &str, value: Expr) -> Statement {
        Statement::Assignment {
            target: self.located(Target::Local(Identifier::new(name))),
            declared: None,
            value,
        }
    }

    pub fn assign_typed(&self, name: &str, declared: &str, value: Expr) -> Statement {
        Statement::Assignment {
            target: self.located(Target::Local(Identifier::new(name))),
            declared: Some(self.id(declared)),
            value,
        }
    }

    pub fn assign_field(&self, field: &str, value: Expr) -> Statement {
        Statement::Assignment {
            target: self.located(Target::Field(Identifier::new(field))),
            declared: None,
            value,
        }
    }

    pub fn if_else(
        &self,
        condition: Expr,
        then: Vec<Statement>,
        otherwise: Option<Vec<Statement>>,
    ) -> Statement {
        Statement::If {
            condition,
            then,
            otherwise,
        }
    }

    pub fn while_loop(&self, condition: Expr, body: Vec<Statement>) -> Statement {
        Statement::While { condition, body }
    }

    pub fn ret(&self, value: Option<Expr>) -> Statement {
        Statement::Return(self.located(value))
    }

    pub fn unused(&self, expr: Expr) -> Statement {
        Statement::Unused(expr)
    }

    pub fn int(&self, value: i32) -> Expr {
        self.expr(ExprKind::Int(value))
    }

    pub fn string(&self, value: &str) -> Expr {
        self.expr(ExprKind::Str(value.to_owned()))
    }

    pub fn boolean(&self, value: bool) -> Expr {
        self.expr(ExprKind::Bool(value))
    }

    pub fn nothing(&self) -> Expr {
        self.expr(ExprKind::Nothing)
    }

    pub fn var(&self, name: &str) -> Expr {
        if name == THIS {
            self.this()
        } else {
            self.expr(ExprKind::Var(Identifier::new(name)))
        }
    }

    pub fn this(&self) -> Expr {
        self.expr(ExprKind::This)
    }

    pub fn field(&self, receiver: Expr, field: &str) -> Expr {
        self.expr(ExprKind::Field {
            receiver: Box::new(receiver),
            field: self.id(field),
        })
    }

    pub fn unary(&self, op: UnOp, operand: Expr) -> Expr {
        self.expr(ExprKind::Unary(op, Box::new(operand)))
    }

    pub fn binary(&self, left: Expr, op: BinOp, right: Expr) -> Expr {
        self.expr(ExprKind::Binary(Box::new(left), op, Box::new(right)))
    }

    pub fn compare(&self, left: Expr, op: CmpOp, right: Expr) -> Expr {
        self.expr(ExprKind::Compare(Box::new(left), op, Box::new(right)))
    }

    pub fn call(&self, receiver: Expr, method: &str, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call {
            receiver: Box::new(receiver),
            method: self.id(method),
            args,
        })
    }

    pub fn new_object(&self, class: &str, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::New {
            class: self.id(class),
            args,
        })
    }

    fn expr(&self, kind: ExprKind) -> Expr {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        Expr {
            id: NodeId(id),
            location: self.location.borrow().clone(),
            kind,
        }
    }

    fn id(&self, name: &str) -> Located<Identifier> {
        self.located(Identifier::new(name))
    }

    fn located<T>(&self, value: T) -> Located<T> {
        Located::at(value, self.location.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Position;

    #[test]
    fn every_expression_gets_a_fresh_id() {
        let ast = Builder::new();
        let sum = ast.binary(ast.int(1), BinOp::Add, ast.var("x"));

        let ids = match &sum.kind {
            ExprKind::Binary(left, _, right) => [left.id, right.id, sum.id],
            _ => unreachable!(),
        };

        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_ne!(ids[0], ids[2]);
    }

    #[test]
    fn nodes_take_the_current_location() {
        let ast = Builder::new();
        let here = Location::new("t.qk", Position::new(4, 2), Position::new(4, 6));

        ast.locate(here.clone());
        let expr = ast.var("x");

        assert_eq!(expr.location, here);
    }

    #[test]
    fn this_is_never_an_ordinary_variable() {
        let ast = Builder::new();
        assert!(matches!(ast.var(THIS).kind, ExprKind::This));
    }
}
