//! Agregación y presentación de errores.
//!
//! Cada fase reporta errores propios envueltos en [`Located`]. Un
//! [`Diagnostics`] los agrupa bajo la fase responsable, la cual se
//! indica con [`Diagnostics::kind()`].

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Debug, Display},
};

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &(dyn Error + 'static);
    fn location(&self) -> &Location;
}

pub struct Diagnostics {
    kind: &'static str,
    errors: Vec<Box<dyn 'static + LocatedError>>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }

    /// Fase que reportó los errores.
    pub fn error_kind(&self) -> &'static str {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn LocatedError> {
        self.errors.iter().map(|error| &**error)
    }

    /// Busca el primer error de tipo `E`.
    pub fn find<E: Error + 'static>(&self) -> Option<&E> {
        self.iter().find_map(|error| error.source().downcast_ref())
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            kind: "error",
            errors: Default::default(),
        }
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            errors: vec![Box::new(error)],
            ..Default::default()
        }
    }
}

impl<E: 'static + LocatedError> From<Vec<E>> for Diagnostics {
    fn from(errors: Vec<E>) -> Self {
        let errors = errors
            .into_iter()
            .map(|error| {
                let errors: Box<dyn LocatedError> = Box::new(error);
                errors
            })
            .collect();

        Diagnostics {
            errors,
            ..Default::default()
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { kind, errors } = self;

        if errors.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for error in errors {
            writeln!(fmt, "{}: {}", kind, error.source())?;
            writeln!(fmt, " --> {}", error.location())?;
            writeln!(fmt)?;
        }

        let error_or_errors = if errors.len() == 1 { "error" } else { "errors" };
        writeln!(
            fmt,
            "Build failed with {} {}",
            errors.len(),
            error_or_errors
        )
    }
}

impl Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, fmt)
    }
}

impl<E: Error + 'static> sealed::Sealed for Located<E> {}

impl<E: Error + 'static> LocatedError for Located<E> {
    fn source(&self) -> &(dyn Error + 'static) {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::Identifier,
        classes::ClassError,
        source::Position,
    };

    fn located(error: ClassError, line: u32) -> Located<ClassError> {
        let location = Location::new("t.qk", Position::new(line, 1), Position::new(line, 2));
        Located::at(error, location)
    }

    #[test]
    fn errors_render_with_kind_and_location() {
        let error = located(ClassError::UnknownClass(Identifier::new("Pt")), 3);
        let diagnostics = Diagnostics::from(error).kind("Class error");

        assert_eq!(
            diagnostics.to_string(),
            "Class error: Class `Pt` is undefined\n --> t.qk:3:1\n\nBuild failed with 1 error\n"
        );
    }

    #[test]
    fn errors_can_be_recovered_by_type() {
        let errors = vec![
            located(ClassError::DuplicateClass(Identifier::new("A")), 1),
            located(ClassError::UnknownClass(Identifier::new("B")), 2),
        ];

        let diagnostics = Diagnostics::from(errors).kind("Class error");
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.error_kind(), "Class error");
        assert_eq!(
            diagnostics.find::<ClassError>(),
            Some(&ClassError::DuplicateClass(Identifier::new("A")))
        );

        assert!(diagnostics.to_string().ends_with("Build failed with 2 errors\n"));
    }
}
