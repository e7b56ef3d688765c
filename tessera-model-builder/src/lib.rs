// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Procedural macros used when building model blocks.

use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

/// Derive `Display` for a model by delegating to its `entity` field.
///
/// Models carry an `entity: Arc<Entity>` whose `Display` produces the full
/// `::`-joined hierarchical name. Deriving `EntityDisplay` makes the model
/// itself print that name, which is what the logging macros expect.
#[proc_macro_derive(EntityDisplay)]
pub fn entity_display(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                self.entity.fmt(f)
            }
        }
    };

    TokenStream::from(expanded)
}
