use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

pub fn derive_component(input: TokenStream) -> TokenStream {
    // Parse the input tokens into a syntax tree
    let ast = parse_macro_input!(input as DeriveInput);

    // Get the struct name we are annotating
    let struct_name = &ast.ident;

    // Use ::kestrel_ecs::component::Component which works both inside and outside the crate.
    // Inside the crate, this works because of `extern crate self as kestrel_ecs;` in lib.rs.
    // Outside the crate, this naturally resolves to the kestrel_ecs dependency.
    TokenStream::from(quote! {
        impl ::kestrel_ecs::component::Component for #struct_name {
        }
    })
}
