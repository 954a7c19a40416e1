//! Tabla de variables.
//!
//! Cada clase tiene un marco para su constructor y uno por método.
//! Un marco asocia nombres de variables a tipos inferidos y recuerda
//! los parámetros formales. Además, cada clase asocia sus campos a
//! tipos. Un nombre sin tipo registrado no es un error por sí mismo:
//! simplemente todavía no se ha observado una asignación que lo tipe.

use std::collections::HashMap;

use crate::{ast::Identifier, classes::ClassTable};

/// Un miembro de clase con código propio.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Member {
    Constructor,
    Method(Identifier),
}

/// Nombres tipados en orden de aparición.
#[derive(Debug, Default)]
pub struct Bindings {
    order: Vec<Identifier>,
    types: HashMap<Identifier, Identifier>,
}

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&Identifier> {
        self.types.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &Identifier> {
        self.order.iter()
    }

    /// Registra un nombre, aunque todavía no tenga tipo.
    pub fn declare(&mut self, name: &Identifier) {
        if !self.order.contains(name) {
            self.order.push(name.clone());
        }
    }

    /// Adopta `typ` si el nombre no tenía tipo, o lo ensancha al ancestro
    /// común con el tipo previo. Nunca lo estrecha. Retorna si cambió.
    pub fn widen(&mut self, classes: &ClassTable, name: &Identifier, typ: &Identifier) -> bool {
        self.declare(name);

        let widened = match self.types.get(name) {
            None => typ.clone(),
            Some(previous) if previous == typ => return false,
            Some(previous) => classes.common_ancestor(previous, typ),
        };

        if self.types.get(name) == Some(&widened) {
            return false;
        }

        log::trace!("`{}` widened to `{}`", name, widened);
        self.types.insert(name.clone(), widened);

        true
    }
}

#[derive(Debug, Default)]
pub struct Frame {
    formals: Vec<Identifier>,
    variables: Bindings,
}

impl Frame {
    /// Parámetros formales en orden.
    pub fn formals(&self) -> &[Identifier] {
        &self.formals
    }

    /// Variables locales que no son parámetros formales.
    pub fn locals(&self) -> impl Iterator<Item = &Identifier> {
        self.variables
            .names()
            .filter(move |name| !self.formals.contains(name))
    }

    pub fn lookup(&self, name: &str) -> Option<&Identifier> {
        self.variables.get(name)
    }

    /// Tipo declarado de un parámetro formal. Los formales no se ensanchan.
    pub fn formal(&self, name: &str) -> Option<&Identifier> {
        if self.formals.iter().any(|formal| formal.as_ref() == name) {
            self.variables.get(name)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct ClassScope {
    fields: Bindings,
    frames: HashMap<Member, Frame>,
}

#[derive(Debug, Default)]
pub struct ScopeTable {
    classes: HashMap<Identifier, ClassScope>,
}

impl ScopeTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Fija los parámetros formales de un miembro junto a sus tipos declarados.
    pub fn set_formals(&mut self, class: &Identifier, member: &Member, formals: &[(Identifier, Identifier)]) {
        let frame = self.frame_mut(class, member);
        frame.formals = formals.iter().map(|(name, _)| name.clone()).collect();

        for (name, typ) in formals {
            frame.variables.declare(name);
            frame
                .variables
                .types
                .entry(name.clone())
                .or_insert_with(|| typ.clone());
        }
    }

    pub fn frame(&self, class: &Identifier, member: &Member) -> Option<&Frame> {
        self.classes.get(class)?.frames.get(member)
    }

    pub fn declare_local(&mut self, class: &Identifier, member: &Member, name: &Identifier) {
        self.frame_mut(class, member).variables.declare(name);
    }

    pub fn local_type(&self, class: &Identifier, member: &Member, name: &str) -> Option<&Identifier> {
        self.frame(class, member)?.lookup(name)
    }

    pub fn widen_local(
        &mut self,
        classes: &ClassTable,
        class: &Identifier,
        member: &Member,
        name: &Identifier,
        typ: &Identifier,
    ) -> bool {
        self.frame_mut(class, member)
            .variables
            .widen(classes, name, typ)
    }

    pub fn widen_field(
        &mut self,
        classes: &ClassTable,
        class: &Identifier,
        field: &Identifier,
        typ: &Identifier,
    ) -> bool {
        self.classes
            .entry(class.clone())
            .or_default()
            .fields
            .widen(classes, field, typ)
    }

    /// Tipo de un campo, buscándolo desde la clase dada hacia la raíz.
    pub fn field_type(&self, classes: &ClassTable, class: &Identifier, field: &str) -> Option<&Identifier> {
        let mut current = class;
        loop {
            let found = self
                .classes
                .get(current)
                .and_then(|scope| scope.fields.get(field));

            if found.is_some() {
                return found;
            }

            match classes.get(current) {
                Ok(descriptor) if descriptor.superclass() != current => {
                    current = descriptor.superclass()
                }

                _ => return None,
            }
        }
    }

    fn frame_mut(&mut self, class: &Identifier, member: &Member) -> &mut Frame {
        self.classes
            .entry(class.clone())
            .or_default()
            .frames
            .entry(member.clone())
            .or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::{INT, ROOT, STRING};

    fn id(name: &str) -> Identifier {
        Identifier::new(name)
    }

    #[test]
    fn first_assignment_adopts_the_type() {
        let classes = ClassTable::new();
        let mut scopes = ScopeTable::new();
        let main = id("main");

        assert!(scopes.widen_local(&classes, &main, &Member::Constructor, &id("x"), &id(INT)));
        assert!(!scopes.widen_local(&classes, &main, &Member::Constructor, &id("x"), &id(INT)));
        assert_eq!(scopes.local_type(&main, &Member::Constructor, "x"), Some(&id(INT)));
    }

    #[test]
    fn conflicting_assignments_widen_and_never_narrow() {
        let classes = ClassTable::new();
        let mut scopes = ScopeTable::new();
        let main = id("main");
        let ctor = Member::Constructor;

        scopes.widen_local(&classes, &main, &ctor, &id("x"), &id(INT));
        assert!(scopes.widen_local(&classes, &main, &ctor, &id("x"), &id(STRING)));
        assert_eq!(scopes.local_type(&main, &ctor, "x"), Some(&id(ROOT)));

        assert!(!scopes.widen_local(&classes, &main, &ctor, &id("x"), &id(INT)));
        assert_eq!(scopes.local_type(&main, &ctor, "x"), Some(&id(ROOT)));
    }

    #[test]
    fn locals_exclude_formals_and_keep_order() {
        let classes = ClassTable::new();
        let mut scopes = ScopeTable::new();
        let pt = id("Pt");
        let method = Member::Method(id("scale"));

        scopes.set_formals(&pt, &method, &[(id("k"), id(INT))]);
        scopes.widen_local(&classes, &pt, &method, &id("b"), &id(INT));
        scopes.widen_local(&classes, &pt, &method, &id("k"), &id(INT));
        scopes.declare_local(&pt, &method, &id("a"));

        let frame = scopes.frame(&pt, &method).unwrap();
        let locals: Vec<_> = frame.locals().map(ToString::to_string).collect();

        assert_eq!(frame.formals(), &[id("k")]);
        assert_eq!(locals, ["b", "a"]);
        assert_eq!(frame.lookup("a"), None);
    }

    #[test]
    fn field_types_are_found_through_ancestors() {
        let mut classes = ClassTable::new();
        classes.register_class(&id("A"), &id(ROOT)).unwrap();
        classes.register_class(&id("B"), &id("A")).unwrap();

        let mut scopes = ScopeTable::new();
        scopes.widen_field(&classes, &id("A"), &id("x"), &id(INT));

        assert_eq!(scopes.field_type(&classes, &id("B"), "x"), Some(&id(INT)));
        assert_eq!(scopes.field_type(&classes, &id("B"), "y"), None);
    }
}
