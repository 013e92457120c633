//! Process Trap Frame
//!
//! User register state saved on entry to the kernel and restored on the way
//! back out.

use crate::config::{FL_IF, SEG_UCODE, SEG_UDATA};

/// Register image pushed by the trap entry path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    // Pushed by `pusha`
    /// EDI register
    pub edi: u32,
    /// ESI register
    pub esi: u32,
    /// EBP register
    pub ebp: u32,
    /// Original ESP (ignored by `popa`)
    pub oesp: u32,
    /// EBX register
    pub ebx: u32,
    /// EDX register
    pub edx: u32,
    /// ECX register
    pub ecx: u32,
    /// EAX register; carries system call return values
    pub eax: u32,

    // Segment registers
    /// GS segment
    pub gs: u32,
    /// FS segment
    pub fs: u32,
    /// Extra segment
    pub es: u32,
    /// Data segment
    pub ds: u32,

    /// Trap number
    pub trapno: u32,
    /// Error code, or zero
    pub err: u32,

    // Interrupt frame (pushed by CPU)
    /// Instruction pointer
    pub eip: u32,
    /// Code segment
    pub cs: u32,
    /// EFLAGS register
    pub eflags: u32,
    /// User stack pointer
    pub esp: u32,
    /// Stack segment
    pub ss: u32,
}

impl TrapFrame {
    /// Frame for a fresh user process: user segments, interrupts enabled,
    /// execution starting at `eip` with the stack at `esp`.
    pub fn user_entry(eip: u32, esp: u32) -> Self {
        let data = u32::from(SEG_UDATA);
        TrapFrame {
            cs: u32::from(SEG_UCODE),
            ds: data,
            es: data,
            ss: data,
            eflags: FL_IF,
            esp,
            eip,
            ..Default::default()
        }
    }

    /// Value the interrupted system call returns to user space.
    pub fn return_value(&self) -> u32 {
        self.eax
    }

    /// Set the value the interrupted system call returns to user space.
    pub fn set_return_value(&mut self, value: u32) {
        self.eax = value;
    }

    /// Whether the frame resumes with interrupts enabled.
    pub fn interrupts_enabled(&self) -> bool {
        self.eflags & FL_IF != 0
    }
}
