/// Run `f` on the unlikely path, e.g. allocator failure
#[cold]
pub fn cold<R, F: FnOnce() -> R>(f: F) -> R {
    f()
}
