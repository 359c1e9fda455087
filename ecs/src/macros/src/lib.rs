mod component;
mod extension;

use proc_macro::TokenStream;

#[proc_macro_derive(Component)]
pub fn derive_component(item: TokenStream) -> TokenStream {
    component::derive_component(item)
}

#[proc_macro_derive(Extension)]
pub fn derive_extension(item: TokenStream) -> TokenStream {
    extension::derive_extension(item)
}
