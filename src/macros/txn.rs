/// Run a block inside the unit of work's transaction scope, with
/// commit/rollback handled automatically.
///
/// The block must evaluate to a `Result`; `Ok` commits, `Err` rolls back and
/// propagates the original error.
///
/// # Example
/// ```ignore
/// let saved = breakwater_txn!(uow, {
///     uow.create(&article)?;
///     uow.update(&ticket)?;
///     Ok(article.id.clone())
/// })?;
/// ```
#[macro_export]
macro_rules! breakwater_txn {
    ($uow:expr, $body:block) => {{
        match $uow.begin() {
            Ok(()) => match (|| $body)() {
                Ok(value) => $uow.commit().map(|()| value),
                Err(e) => {
                    // Preserve the block's error even if rollback also fails.
                    let _ = $uow.rollback();
                    Err(e)
                }
            },
            Err(e) => Err(e),
        }
    }};
}
