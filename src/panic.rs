use crate::{logger, stop, Stop};

/// The panic handler. Called when the kernel encounters a fatal error
/// it cannot recover from.
#[cold]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    logger::on_panic();
    log::error!("The kernel has encountered a fatal error that it cannot recover from");
    log::error!("The kernel must stop to prevent further damage");
    log::error!("{info}");

    stop(Stop::Failure);
}
