//! Saved kernel execution context.

/// Where a suspended kernel thread resumes.
///
/// The switch routine pushes the callee-saved registers onto the thread's
/// own kernel stack, so the only thing that must live outside the stack is
/// the stack pointer itself. A zeroed context is a valid save target but
/// must never be loaded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Context {
    /// Saved kernel stack pointer.
    pub stack_pointer: usize,
}

impl Context {
    /// Wrap a stack pointer prepared by the switch routine.
    pub const fn new(stack_pointer: usize) -> Self {
        Context { stack_pointer }
    }

    /// Has anything been saved here yet?
    pub fn is_empty(&self) -> bool {
        self.stack_pointer == 0
    }
}
