/// Declara la tabla de clases primitivas.
///
/// Cada clase lista sus métodos como `"nombre"(Param, ...) -> Retorno`.
/// Una lista vacía de parámetros significa "sin verificar". La
/// expansión es un slice constante de `(clase, métodos)`.
macro_rules! builtin_classes {
    ($($class:ident { $($method:literal ($($param:ident),*) -> $returns:ident),* $(,)? })*) => {
        &[$(
            (
                stringify!($class),
                &[$(($method, &[$(stringify!($param)),*], stringify!($returns))),*],
            )
        ),*]
    };
}
