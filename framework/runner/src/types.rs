/// Recommended error type for your scenario `main` function and any shared code that you write
/// for fixtures and scenarios. This type is compatible with the [crate::prelude::HookResult] type
/// so you can use `?` to propagate errors.
pub type SquallResult<T> = anyhow::Result<T>;
