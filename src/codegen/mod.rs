//! Generación de código para la máquina de pila.
//!
//! Recorre el árbol ya verificado y produce un [`ClassCode`] por clase.
//! Todo despacho usa los tipos registrados por el verificador en
//! [`Types`](crate::semantic::Types); una expresión sin tipo a esta
//! altura es un error interno y se reporta como [`CodegenError`].
//!
//! # Convenciones de pila
//! El receptor de una llamada debe quedar en el tope. Las llamadas
//! apilan receptor y argumentos de izquierda a derecha y luego rotan el
//! receptor hacia arriba con `roll`. Los operadores relacionales no
//! rotan: en su lugar invocan el método inverso, ya que el receptor
//! efectivo es el operando derecho.

use std::io::{self, Write};
use thiserror::Error;

use crate::{
    ast::{BinOp, CmpOp, Expr, ExprKind, Formal, Identifier, Program, Statement, Target, UnOp},
    classes::{ClassError, BOOL, CONSTRUCTOR},
    ir::{Assembly, ClassCode, Const, Instruction, Label, MethodCode, RECEIVER},
    scope::Member,
    semantic::Tables,
    source::{Located, Location},
};

mod branch;

pub type Codegen<T> = Result<T, Located<CodegenError>>;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("Expression reached code generation without a type")]
    Untyped,

    #[error(transparent)]
    Class(#[from] ClassError),
}

/// Genera el flujo de instrucciones de cada clase de la unidad.
pub fn generate(
    program: &Program,
    tables: &Tables,
    main: &Identifier,
    keep_unused: bool,
) -> Codegen<Assembly> {
    log::debug!("generating code for {} classes", program.classes.len() + 1);

    let mut generator = Generator {
        tables,
        class: main.clone(),
        member: Member::Constructor,
        arity: 0,
        code: Vec::new(),
        labels: 0,
        keep_unused,
    };

    let mut assembly = Assembly::default();
    for class in &program.classes {
        let signature = &class.signature;
        let members = class.body.methods.iter().map(|method| {
            let member = Member::Method(method.name.as_ref().clone());
            (member, &method.formals[..], &method.body[..])
        });

        let constructor = (Member::Constructor, &signature.formals[..], &class.body.statements[..]);
        let members = std::iter::once(constructor).chain(members);

        let code = generator.class(signature.name.as_ref(), signature.name.location(), members)?;
        assembly.classes.push(code);
    }

    let members = std::iter::once((Member::Constructor, &[][..], &program.statements[..]));
    let code = generator.class(main, &Location::default(), members)?;
    assembly.classes.push(code);

    Ok(assembly)
}

/// Escribe la forma textual de una clase.
pub fn write<W: Write>(class: &ClassCode, output: &mut W) -> io::Result<()> {
    writeln!(output, ".class {}:{}", class.name, class.superclass)?;
    for field in &class.fields {
        writeln!(output, ".field {}", field)?;
    }

    for method in &class.methods {
        writeln!(output)?;
        writeln!(output, ".method {}", method.name)?;

        if !method.args.is_empty() {
            writeln!(output, ".args {}", join(&method.args))?;
        }

        if !method.locals.is_empty() {
            writeln!(output, ".local {}", join(&method.locals))?;
        }

        writeln!(output, "enter")?;
        for instruction in &method.body {
            writeln!(output, "{}", instruction)?;
        }
    }

    Ok(())
}

/// Método que implementa una comparación en ensamblador.
///
/// El receptor efectivo es el operando derecho, así que `a > b` se
/// evalúa como `b.less(a)`. El despacho usa el tipo del operando
/// izquierdo. Los operadores booleanos no despachan.
fn dispatched(op: CmpOp) -> Option<&'static str> {
    match op {
        CmpOp::Equal | CmpOp::NotEqual => Some("equals"),
        CmpOp::Greater => Some("less"),
        CmpOp::GreaterOrEqual => Some("less_eq"),
        CmpOp::Less => Some("greater"),
        CmpOp::LessOrEqual => Some("greater_eq"),
        CmpOp::And | CmpOp::Or => None,
    }
}

fn join(names: &[Identifier]) -> String {
    names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(",")
}

struct Generator<'a> {
    tables: &'a Tables,
    class: Identifier,
    member: Member,
    arity: usize,
    code: Vec<Instruction>,
    labels: u32,
    keep_unused: bool,
}

impl Generator<'_> {
    fn class<'p, I>(&mut self, name: &Identifier, location: &Location, members: I) -> Codegen<ClassCode>
    where
        I: Iterator<Item = (Member, &'p [Formal], &'p [Statement])>,
    {
        let tables = self.tables;
        let descriptor = tables
            .classes
            .get(name)
            .map_err(|error| Located::at(error.into(), location.clone()))?;

        self.class = name.clone();

        let methods = members
            .map(|(member, formals, body)| self.member(member, formals, body))
            .collect::<Codegen<Vec<_>>>()?;

        Ok(ClassCode {
            name: name.clone(),
            superclass: descriptor.superclass().clone(),
            fields: descriptor.fields().to_vec(),
            methods,
        })
    }

    fn member(&mut self, member: Member, formals: &[Formal], body: &[Statement]) -> Codegen<MethodCode> {
        self.member = member;
        self.arity = formals.len();
        self.code.clear();

        self.block(body)?;
        if !matches!(body.last(), Some(Statement::Return(_))) {
            self.implicit_return();
        }

        let args: Vec<_> = formals.iter().map(|formal| formal.name.as_ref().clone()).collect();
        let locals = match self.tables.scopes.frame(&self.class, &self.member) {
            Some(frame) => frame.locals().cloned().collect(),
            None => Vec::new(),
        };

        let name = match &self.member {
            Member::Constructor => Identifier::new(CONSTRUCTOR),
            Member::Method(name) => name.clone(),
        };

        Ok(MethodCode {
            name,
            args,
            locals,
            body: std::mem::take(&mut self.code),
        })
    }

    fn implicit_return(&mut self) {
        let value = match self.member {
            Member::Constructor => Instruction::LoadThis,
            Member::Method(_) => Instruction::Const(Const::Nothing),
        };

        self.emit(value);
        self.emit(Instruction::Return(self.arity));
    }

    fn block(&mut self, statements: &[Statement]) -> Codegen<()> {
        statements
            .iter()
            .try_for_each(|statement| self.statement(statement))
    }

    fn statement(&mut self, statement: &Statement) -> Codegen<()> {
        match statement {
            Statement::Assignment { target, value, .. } => {
                self.expr(value)?;
                match target.as_ref() {
                    Target::Local(name) => self.emit(Instruction::Store(name.clone())),
                    Target::Field(field) => {
                        self.emit(Instruction::LoadThis);
                        self.emit(Instruction::StoreField {
                            class: Identifier::new(RECEIVER),
                            field: field.clone(),
                        });
                    }
                }
            }

            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                let compare = self.label("ifcmp");
                self.emit(Instruction::Jump(compare));

                let body = self.label("ifbody");
                self.emit(Instruction::SetLabel(body));
                self.block(then)?;

                let end = compare.end();
                self.emit(Instruction::Jump(end));
                self.emit(Instruction::SetLabel(compare));

                match otherwise {
                    None => self.jump_if_true(condition, body, end)?,
                    Some(otherwise) => {
                        let otherwise_label = self.label("else");
                        self.jump_if_true(condition, body, otherwise_label)?;
                        self.emit(Instruction::SetLabel(otherwise_label));
                        self.block(otherwise)?;
                    }
                }

                self.emit(Instruction::SetLabel(end));
            }

            Statement::While { condition, body } => {
                let compare = self.label("whilecmp");
                self.emit(Instruction::Jump(compare));

                let start = self.label("whilebody");
                self.emit(Instruction::SetLabel(start));
                self.block(body)?;

                let end = compare.end();
                self.emit(Instruction::SetLabel(compare));
                self.jump_if_true(condition, start, end)?;
                self.emit(Instruction::SetLabel(end));
            }

            Statement::Return(value) => {
                match value.as_ref() {
                    Some(value) => self.expr(value)?,
                    None if self.member == Member::Constructor => self.emit(Instruction::LoadThis),
                    None => self.emit(Instruction::Const(Const::Nothing)),
                }

                self.emit(Instruction::Return(self.arity));
            }

            Statement::Unused(expr) => {
                self.expr(expr)?;
                if !self.keep_unused {
                    self.emit(Instruction::Pop);
                }
            }
        }

        Ok(())
    }

    /// Evalúa una expresión y deja su valor en el tope de la pila.
    fn expr(&mut self, expr: &Expr) -> Codegen<()> {
        use ExprKind::*;

        match &expr.kind {
            Int(value) => self.emit(Instruction::Const(Const::Int(*value))),
            Str(value) => self.emit(Instruction::Const(Const::Str(value.clone()))),
            Bool(value) => self.emit(Instruction::Const(Const::Bool(*value))),
            Nothing => self.emit(Instruction::Const(Const::Nothing)),
            Var(name) => self.emit(Instruction::Load(name.clone())),
            This => self.emit(Instruction::LoadThis),

            Field { receiver, field } => {
                let class = match receiver.kind {
                    This => Identifier::new(RECEIVER),
                    _ => self.type_of(receiver)?,
                };

                self.expr(receiver)?;
                self.emit(Instruction::LoadField {
                    class,
                    field: field.as_ref().clone(),
                });
            }

            Unary(op, operand) => {
                let class = match op {
                    UnOp::Not => Identifier::new(BOOL),
                    UnOp::Neg => self.type_of(operand)?,
                };

                self.expr(operand)?;
                self.emit(Instruction::call(&class, "negate"));
            }

            Binary(left, op, right) => self.binary(left, *op, right)?,

            Compare(left, op, right) => match dispatched(*op) {
                Some(method) => self.compare(left, method, *op == CmpOp::NotEqual, right)?,
                None => self.materialize(expr)?,
            },

            Call {
                receiver,
                method,
                args,
            } => {
                let class = self.type_of(receiver)?;

                self.expr(receiver)?;
                for arg in args {
                    self.expr(arg)?;
                }

                if !args.is_empty() {
                    self.emit(Instruction::Roll(args.len()));
                }

                self.emit(Instruction::Call {
                    class,
                    method: method.as_ref().clone(),
                });
            }

            New { class, args } => {
                for arg in args {
                    self.expr(arg)?;
                }

                self.emit(Instruction::New(class.as_ref().clone()));
                self.emit(Instruction::call(class.as_ref(), CONSTRUCTOR));
            }
        }

        Ok(())
    }

    fn binary(&mut self, left: &Expr, op: BinOp, right: &Expr) -> Codegen<()> {
        let class = self.type_of(left)?;

        self.expr(left)?;
        self.expr(right)?;
        self.emit(Instruction::Roll(1));
        self.emit(Instruction::call(&class, op.method()));

        Ok(())
    }

    fn compare(&mut self, left: &Expr, method: &str, negate: bool, right: &Expr) -> Codegen<()> {
        let class = self.type_of(left)?;

        self.expr(left)?;
        self.expr(right)?;

        self.emit(Instruction::call(&class, method));
        if negate {
            self.emit(Instruction::call(&Identifier::new(BOOL), "negate"));
        }

        Ok(())
    }

    fn type_of(&self, expr: &Expr) -> Codegen<Identifier> {
        self.tables
            .types
            .of(expr.id)
            .cloned()
            .ok_or_else(|| Located::at(CodegenError::Untyped, expr.location.clone()))
    }

    fn label(&mut self, kind: &'static str) -> Label {
        let label = Label::new(kind, self.labels);
        self.labels += 1;

        log::trace!("minted label {}", label);
        label
    }

    fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::Builder,
        semantic::{check, declare},
    };

    fn compile(program: &Program) -> Assembly {
        let main = Identifier::new("main");
        let mut tables = Tables::new();

        declare(program, &mut tables, &main).unwrap();
        check(program, &mut tables, &main).unwrap();
        generate(program, &tables, &main, false).unwrap()
    }

    fn main_body(assembly: &Assembly) -> Vec<String> {
        assembly.class("main").unwrap().methods[0]
            .body
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn render(class: &ClassCode) -> String {
        let mut output = Vec::new();
        write(class, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn relational_operators_call_the_inverse_method() {
        let cases = [
            (CmpOp::Greater, "call Int:less"),
            (CmpOp::GreaterOrEqual, "call Int:less_eq"),
            (CmpOp::Less, "call Int:greater"),
            (CmpOp::LessOrEqual, "call Int:greater_eq"),
            (CmpOp::Equal, "call Int:equals"),
        ];

        for (op, call) in cases {
            let ast = Builder::new();
            let program = ast.program(vec![], vec![ast.assign("b", ast.compare(ast.int(1), op, ast.int(2)))]);

            let body = main_body(&compile(&program));
            assert_eq!(body[..4], ["const 1", "const 2", call, "store b"], "{}", op);
        }
    }

    #[test]
    fn inequality_negates_equals() {
        let ast = Builder::new();
        let program = ast.program(
            vec![],
            vec![ast.assign("b", ast.compare(ast.string("a"), CmpOp::NotEqual, ast.string("b")))],
        );

        let body = main_body(&compile(&program));
        assert_eq!(
            body[..5],
            [r#"const "a""#, r#"const "b""#, "call String:equals", "call Bool:negate", "store b"]
        );
    }

    #[test]
    fn arithmetic_rolls_the_receiver_to_the_top() {
        let ast = Builder::new();
        let program = ast.program(
            vec![],
            vec![ast.assign("x", ast.binary(ast.int(7), BinOp::Sub, ast.int(2)))],
        );

        let body = main_body(&compile(&program));
        assert_eq!(body[..5], ["const 7", "const 2", "roll 1", "call Int:minus", "store x"]);
    }

    #[test]
    fn calls_roll_past_their_arguments() {
        let ast = Builder::new();
        let program = ast.program(
            vec![],
            vec![
                ast.unused(ast.call(ast.int(1), "plus", vec![ast.int(2)])),
                ast.unused(ast.call(ast.int(1), "print", vec![])),
            ],
        );

        let body = main_body(&compile(&program));
        assert_eq!(
            body,
            [
                "const 1",
                "const 2",
                "roll 1",
                "call Int:plus",
                "pop",
                "const 1",
                "call Int:print",
                "pop",
                "load $",
                "return 0",
            ]
        );
    }

    #[test]
    fn unused_values_can_stay_on_the_stack() {
        let ast = Builder::new();
        let program = ast.program(vec![], vec![ast.unused(ast.int(1))]);

        let main = Identifier::new("main");
        let mut tables = Tables::new();
        declare(&program, &mut tables, &main).unwrap();
        check(&program, &mut tables, &main).unwrap();

        let assembly = generate(&program, &tables, &main, true).unwrap();
        assert_eq!(main_body(&assembly), ["const 1", "load $", "return 0"]);
    }

    #[test]
    fn while_loops_test_at_the_bottom() {
        let ast = Builder::new();
        let program = ast.program(
            vec![],
            vec![
                ast.assign("i", ast.int(0)),
                ast.while_loop(
                    ast.compare(ast.var("i"), CmpOp::Less, ast.int(3)),
                    vec![ast.assign("i", ast.binary(ast.var("i"), BinOp::Add, ast.int(1)))],
                ),
            ],
        );

        let body = main_body(&compile(&program));
        assert_eq!(
            body,
            [
                "const 0",
                "store i",
                "jump labelwhilecmp0",
                "labelwhilebody1:",
                "load i",
                "const 1",
                "roll 1",
                "call Int:plus",
                "store i",
                "labelwhilecmp0:",
                "load i",
                "const 3",
                "call Int:greater",
                "jump_if labelwhilebody1",
                "endlabelwhilecmp0:",
                "load $",
                "return 0",
            ]
        );
    }

    #[test]
    fn classes_render_header_fields_and_members() {
        let ast = Builder::new();
        let pt = ast.class(
            "Pt",
            None,
            vec![ast.formal("x", "Int"), ast.formal("y", "Int")],
            vec![ast.assign_field("x", ast.var("x")), ast.assign_field("y", ast.var("y"))],
            vec![ast.method(
                "sum",
                vec![],
                "Int",
                vec![
                    ast.assign("s", ast.binary(ast.field(ast.this(), "x"), BinOp::Add, ast.field(ast.this(), "y"))),
                    ast.ret(Some(ast.var("s"))),
                ],
            )],
        );

        let program = ast.program(
            vec![pt],
            vec![ast.assign("p", ast.new_object("Pt", vec![ast.int(1), ast.int(2)]))],
        );

        let assembly = compile(&program);
        let names: Vec<_> = assembly.classes.iter().map(|class| class.name.to_string()).collect();
        assert_eq!(names, ["Pt", "main"]);

        let expected = "\
.class Pt:Obj
.field x
.field y

.method $constructor
.args x,y
enter
load x
load $
store_field $:x
load y
load $
store_field $:y
load $
return 2

.method sum
.local s
enter
load $
load_field $:x
load $
load_field $:y
roll 1
call Int:plus
store s
load s
return 0
";

        assert_eq!(render(assembly.class("Pt").unwrap()), expected);
        assert_eq!(
            main_body(&assembly),
            ["const 1", "const 2", "new Pt", "call Pt:$constructor", "store p", "load $", "return 0"]
        );
    }

    #[test]
    fn methods_without_return_yield_nothing() {
        let ast = Builder::new();
        let class = ast.class(
            "K",
            None,
            vec![],
            vec![],
            vec![ast.method("f", vec![ast.formal("a", "Int")], "Nothing", vec![])],
        );

        let program = ast.program(vec![class], vec![]);
        let assembly = compile(&program);
        let f = assembly.class("K").unwrap().method("f").unwrap();

        let body: Vec<_> = f.body.iter().map(ToString::to_string).collect();
        assert_eq!(body, ["const nothing", "return 1"]);
        assert_eq!(f.args, [Identifier::new("a")]);
    }

    #[test]
    fn untyped_expressions_are_reported() {
        let ast = Builder::new();
        let program = ast.program(
            vec![],
            vec![ast.unused(ast.binary(ast.int(1), BinOp::Add, ast.int(2)))],
        );

        let main = Identifier::new("main");
        let mut tables = Tables::new();
        declare(&program, &mut tables, &main).unwrap();

        let error = generate(&program, &tables, &main, false).unwrap_err();
        assert_eq!(error.into_inner(), CodegenError::Untyped);
    }
}
