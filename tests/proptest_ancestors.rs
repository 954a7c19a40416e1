//! Pruebas basadas en propiedades para ancestros comunes y ensanchamiento.
//!
//! Las jerarquías se generan al azar con herencia simple: la clase
//! `C{i}` hereda de `Obj` o de alguna `C{j}` con `j < i`, lo cual
//! respeta el orden de declaración que exige la tabla de clases.

mod common;

use common::ClassTable;
use proptest::prelude::*;
use proptest::sample::Index;
use quack::{
    ast::Identifier,
    classes::{BOOL, INT, NOTHING, ROOT, STRING},
    scope::{Member, ScopeTable},
};

/// Construye una jerarquía a partir de la elección de padre de cada clase.
fn hierarchy(parents: &[Index]) -> (ClassTable, Vec<Identifier>) {
    let mut table = ClassTable::new();
    let mut names: Vec<Identifier> = [ROOT, INT, BOOL, STRING, NOTHING]
        .iter()
        .map(|name| Identifier::new(name))
        .collect();

    for (i, parent) in parents.iter().enumerate() {
        let name = Identifier::new(&format!("C{}", i));

        // Cero es la raíz; el resto son clases de usuario previas
        let choice = parent.index(i + 1);
        let superclass = match choice {
            0 => Identifier::new(ROOT),
            k => Identifier::new(&format!("C{}", k - 1)),
        };

        table.register_class(&name, &superclass).unwrap();
        names.push(name);
    }

    (table, names)
}

fn classes() -> impl Strategy<Value = Vec<Index>> {
    prop::collection::vec(any::<Index>(), 1..16)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// El ancestro común no depende del orden de los argumentos
    #[test]
    fn common_ancestor_is_commutative(parents in classes(), a in any::<Index>(), b in any::<Index>()) {
        let (table, names) = hierarchy(&parents);
        let a = a.get(&names);
        let b = b.get(&names);

        prop_assert_eq!(table.common_ancestor(a, b), table.common_ancestor(b, a));
    }

    /// El resultado siempre es ancestro de ambas clases
    #[test]
    fn common_ancestor_bounds_both_classes(parents in classes(), a in any::<Index>(), b in any::<Index>()) {
        let (table, names) = hierarchy(&parents);
        let a = a.get(&names);
        let b = b.get(&names);
        let ancestor = table.common_ancestor(a, b);

        prop_assert!(table.is_subclass(a, &ancestor));
        prop_assert!(table.is_subclass(b, &ancestor));
    }

    /// Una clase es su propio ancestro común
    #[test]
    fn common_ancestor_is_reflexive(parents in classes(), a in any::<Index>()) {
        let (table, names) = hierarchy(&parents);
        let a = a.get(&names);

        prop_assert_eq!(&table.common_ancestor(a, a), a);
    }

    /// Ninguna asignación estrecha el tipo de una variable
    #[test]
    fn widening_is_monotonic(parents in classes(), assigned in prop::collection::vec(any::<Index>(), 1..12)) {
        let (table, names) = hierarchy(&parents);
        let mut scopes = ScopeTable::new();

        let main = Identifier::new("main");
        let x = Identifier::new("x");
        let mut previous: Option<Identifier> = None;

        for index in assigned {
            let typ = index.get(&names);
            scopes.widen_local(&table, &main, &Member::Constructor, &x, typ);

            let current = scopes
                .local_type(&main, &Member::Constructor, "x")
                .cloned()
                .unwrap();

            prop_assert!(table.is_subclass(typ, &current));
            if let Some(previous) = &previous {
                prop_assert!(table.is_subclass(previous, &current));
            }

            previous = Some(current);
        }
    }
}
