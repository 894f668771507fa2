/// Run a closure on a `may` coroutine and bind its result.
///
/// Operations in this crate are blocking and suspend only at adapter I/O,
/// which makes them coroutine-friendly; this macro gives the spawn/join
/// ergonomics for running a whole unit of work off the current stack.
///
/// # Example
/// ```ignore
/// breakwater_go!(result, {
///     let mut uow = UnitOfWork::open(&source, &registry)?;
///     uow.create(&article)?;
///     Ok::<_, EngineError>(())
/// });
/// result?;
/// ```
#[macro_export]
macro_rules! breakwater_go {
    ($ret:ident, $body:expr) => {
        let $ret = {
            let handle = may::go!(move || $body);
            match handle.join() {
                Ok(value) => value,
                Err(e) => Err($crate::EngineError::Transaction(format!(
                    "coroutine panicked: {e:?}"
                ))),
            }
        };
    };
}
