//! Tabla de clases.
//!
//! Registro de descriptores de clase para una unidad de compilación:
//! superclase, conjunto de campos y firmas de métodos. La tabla guarda
//! firmas *aplanadas*, es decir, cada descriptor contiene tanto sus
//! métodos propios como los heredados, por lo cual una búsqueda es un
//! único acceso a mapa y no un recorrido de la cadena de ancestros.
//!
//! El lenguaje solo tiene herencia simple y toda cadena termina en la
//! raíz [`ROOT`], que es su propia superclase.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::ast::Identifier;

/// Clase raíz de la jerarquía.
pub const ROOT: &str = "Obj";

/// Nombre reservado del método constructor.
pub const CONSTRUCTOR: &str = "$constructor";

pub const INT: &str = "Int";
pub const BOOL: &str = "Bool";
pub const STRING: &str = "String";
pub const NOTHING: &str = "Nothing";

type BuiltinTable = &'static [(&'static str, &'static [(&'static str, &'static [&'static str], &'static str)])];

const BUILTINS: BuiltinTable = builtin_classes! {
    Obj {
        "$constructor"() -> Obj,
        "string"() -> String,
        "print"() -> Nothing,
        "equals"(Obj) -> Bool,
    }

    Int {
        "$constructor"() -> Int,
        "string"() -> String,
        "print"() -> Nothing,
        "equals"(Int) -> Bool,
        "less"(Int) -> Bool,
        "greater"(Int) -> Bool,
        "less_eq"(Int) -> Bool,
        "greater_eq"(Int) -> Bool,
        "negate"(Int) -> Int,
        "plus"(Int) -> Int,
        "minus"(Int) -> Int,
        "times"(Int) -> Int,
        "divide"(Int) -> Int,
    }

    Bool {
        "$constructor"() -> Bool,
        "string"() -> String,
        "print"() -> Nothing,
        "equals"(Bool) -> Bool,
        "negate"(Bool) -> Bool,
    }

    String {
        "$constructor"() -> String,
        "string"() -> String,
        "print"() -> Nothing,
        "equals"(String) -> Bool,
        "less"(String) -> Bool,
        "plus"(String) -> String,
    }

    Nothing {
        "$constructor"() -> Nothing,
        "string"() -> String,
        "print"() -> String,
        "equals"() -> String,
    }
};

/// Firma de un método.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Identifier>,
    pub returns: Identifier,
}

#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    name: Identifier,
    superclass: Identifier,
    fields: Vec<Identifier>,
    methods: HashMap<Identifier, Signature>,
    own: HashSet<Identifier>,
    builtin: bool,
}

impl ClassDescriptor {
    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn superclass(&self) -> &Identifier {
        &self.superclass
    }

    /// Campos propios y heredados, en orden de descubrimiento.
    pub fn fields(&self) -> &[Identifier] {
        &self.fields
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|known| known.as_ref() == field)
    }

    pub fn method(&self, method: &str) -> Option<&Signature> {
        self.methods.get(method)
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }
}

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassError {
    #[error("Class `{0}` is undefined")]
    UnknownClass(Identifier),

    #[error("Class `{0}` is already defined")]
    DuplicateClass(Identifier),

    #[error("Method `{0}:{1}` is undefined")]
    UnknownMethod(Identifier, Identifier),
}

pub struct ClassTable {
    classes: HashMap<Identifier, ClassDescriptor>,
    order: Vec<Identifier>,
}

impl Default for ClassTable {
    fn default() -> Self {
        ClassTable::new()
    }
}

impl ClassTable {
    /// Construye una tabla que contiene únicamente las clases primitivas.
    pub fn new() -> Self {
        let root = Identifier::new(ROOT);
        let mut table = ClassTable {
            classes: HashMap::new(),
            order: Vec::new(),
        };

        for &(name, methods) in BUILTINS {
            let name = Identifier::new(name);
            let methods = methods
                .iter()
                .map(|&(method, params, returns)| {
                    let signature = Signature {
                        params: params.iter().copied().map(Identifier::new).collect(),
                        returns: Identifier::new(returns),
                    };

                    (Identifier::new(method), signature)
                })
                .collect::<HashMap<_, _>>();

            let descriptor = ClassDescriptor {
                name: name.clone(),
                superclass: root.clone(),
                fields: Vec::new(),
                own: methods.keys().cloned().collect(),
                methods,
                builtin: true,
            };

            table.order.push(name.clone());
            table.classes.insert(name, descriptor);
        }

        table
    }

    /// Registra una clase de usuario.
    ///
    /// El descriptor nuevo parte de una copia de los campos y métodos
    /// de su superclase, la cual debe existir previamente. Volver a
    /// registrar una clase con la misma superclase no tiene efecto.
    pub fn register_class(
        &mut self,
        name: &Identifier,
        superclass: &Identifier,
    ) -> Result<(), ClassError> {
        if let Some(existing) = self.classes.get(name) {
            if existing.builtin || existing.superclass != *superclass {
                return Err(ClassError::DuplicateClass(name.clone()));
            }

            return Ok(());
        }

        let parent = self
            .classes
            .get(superclass)
            .ok_or_else(|| ClassError::UnknownClass(superclass.clone()))?;

        let descriptor = ClassDescriptor {
            name: name.clone(),
            superclass: superclass.clone(),
            fields: parent.fields.clone(),
            methods: parent.methods.clone(),
            own: HashSet::new(),
            builtin: false,
        };

        log::trace!("registered class {}:{}", name, superclass);

        self.order.push(name.clone());
        self.classes.insert(name.clone(), descriptor);
        Ok(())
    }

    /// Agrega o reemplaza la firma de un método propio de una clase.
    ///
    /// Retorna si la tabla cambió.
    pub fn add_method(
        &mut self,
        class: &Identifier,
        method: &Identifier,
        params: Vec<Identifier>,
        returns: Identifier,
    ) -> Result<bool, ClassError> {
        let descriptor = self.get_mut(class)?;
        let signature = Signature { params, returns };

        descriptor.own.insert(method.clone());
        if descriptor.methods.get(method) == Some(&signature) {
            return Ok(false);
        }

        log::trace!("method {}:{} is now {:?}", class, method, signature);
        descriptor.methods.insert(method.clone(), signature);

        Ok(true)
    }

    /// Agrega un campo a una clase. Retorna si la tabla cambió.
    pub fn add_field(&mut self, class: &Identifier, field: &Identifier) -> Result<bool, ClassError> {
        let descriptor = self.get_mut(class)?;
        if descriptor.fields.contains(field) {
            return Ok(false);
        }

        log::trace!("field {}.{} discovered", class, field);
        descriptor.fields.push(field.clone());

        Ok(true)
    }

    /// Actualiza una clase con métodos y campos que su superclase obtuvo
    /// después del registro. Nunca reemplaza métodos propios.
    ///
    /// Retorna si la tabla cambió.
    pub fn inherit(&mut self, class: &Identifier) -> Result<bool, ClassError> {
        let superclass = self.get(class)?.superclass.clone();
        if superclass == *class {
            return Ok(false);
        }

        let parent = self.get(&superclass)?;
        let parent_methods = parent.methods.clone();
        let mut fields = parent.fields.clone();

        let descriptor = self.get_mut(class)?;
        let mut changed = false;

        for (method, signature) in parent_methods {
            if descriptor.own.contains(&method) || descriptor.methods.get(&method) == Some(&signature)
            {
                continue;
            }

            descriptor.methods.insert(method, signature);
            changed = true;
        }

        for field in descriptor.fields.iter() {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }

        if fields != descriptor.fields {
            descriptor.fields = fields;
            changed = true;
        }

        Ok(changed)
    }

    /// Obtiene la firma de un método, propio o heredado.
    pub fn lookup_signature(&self, class: &Identifier, method: &Identifier) -> Result<&Signature, ClassError> {
        self.get(class)?
            .methods
            .get(method)
            .ok_or_else(|| ClassError::UnknownMethod(class.clone(), method.clone()))
    }

    /// Ancestro común de dos clases.
    ///
    /// Ambas cadenas avanzan a la vez, un paso por iteración. En cada paso
    /// se compara el padre de un cursor contra el otro cursor. Para cadenas
    /// de distinta profundidad el resultado puede ser un ancestro más alto
    /// que el mínimo; la raíz siempre es un resultado válido.
    pub fn common_ancestor(&self, first: &Identifier, second: &Identifier) -> Identifier {
        let root = Identifier::new(ROOT);
        let (mut first, mut second) = (first.clone(), second.clone());

        while first != second {
            let (first_parent, second_parent) = match (self.classes.get(&first), self.classes.get(&second)) {
                (Some(f), Some(s)) => (f.superclass.clone(), s.superclass.clone()),
                _ => return root,
            };

            if first_parent == second {
                return second;
            } else if second_parent == first {
                return first;
            }

            first = first_parent;
            second = second_parent;

            if first == root {
                return first;
            } else if second == root {
                return second;
            }
        }

        first
    }

    /// Determina si `sub` es `sup` o alguno de sus descendientes.
    pub fn is_subclass(&self, sub: &Identifier, sup: &Identifier) -> bool {
        let mut current = sub;
        loop {
            if current == sup {
                return true;
            }

            match self.classes.get(current) {
                Some(descriptor) if descriptor.superclass != *current => {
                    current = &descriptor.superclass
                }

                _ => return false,
            }
        }
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn get(&self, class: &Identifier) -> Result<&ClassDescriptor, ClassError> {
        self.classes
            .get(class)
            .ok_or_else(|| ClassError::UnknownClass(class.clone()))
    }

    /// Clases de usuario en orden de registro.
    pub fn user_classes(&self) -> impl Iterator<Item = &ClassDescriptor> {
        self.order
            .iter()
            .filter_map(move |name| self.classes.get(name))
            .filter(|descriptor| !descriptor.is_builtin())
    }

    fn get_mut(&mut self, class: &Identifier) -> Result<&mut ClassDescriptor, ClassError> {
        self.classes
            .get_mut(class)
            .ok_or_else(|| ClassError::UnknownClass(class.clone()))
    }
}
