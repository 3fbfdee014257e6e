//! The QEMU `isa-debug-exit` device: a single I/O port that ends the
//! emulator's process with a caller-chosen exit code. Only reachable
//! under the `qemu` feature, since writing to this port on real
//! hardware is undefined behavior.

use crate::io::Port;

/// Exits QEMU with `code`. The process's actual exit status is
/// `(code << 1) | 1`, a quirk of how the `isa-debug-exit` device
/// encodes the value it was written.
///
/// # Safety
/// Must only run when actually under QEMU with `-device
/// isa-debug-exit,iobase=0x501`; on real hardware this port write is
/// undefined behavior.
pub unsafe fn exit(code: u32) -> ! {
    Port::new(0x501).write(code);
    crate::x86_64::cpu::freeze();
}
