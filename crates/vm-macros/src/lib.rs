//! Procedural macros used by the kernel to reduce boilerplate around the
//! boot sequence. Kept deliberately small: only the attribute the core
//! subsystem and its boot glue actually use.
use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemFn};

/// Marks a function as only being called during kernel initialization.
/// The function is placed in a dedicated `.init` link section so the
/// memory it occupies can be reclaimed once boot is finished (see
/// `mm::reclaim_boot_memory`).
///
/// # Safety
/// Calling a function annotated with this attribute after boot has
/// completed is undefined behavior: the `.init` section may already have
/// been reclaimed and reused for other purposes.
#[proc_macro_attribute]
pub fn init(_: TokenStream, item: TokenStream) -> TokenStream {
    let mut input_fn = parse_macro_input!(item as ItemFn);
    input_fn
        .attrs
        .push(syn::parse_quote!(#[link_section = ".init"]));

    TokenStream::from(quote::quote!(#input_fn))
}
