//! Derive macros for the Taskboard state layer
//!
//! This crate provides procedural macros that remove boilerplate from
//! action enums and store state structs.
//!
//! # Available Macros
//!
//! - `#[derive(Action)]` - Classifies action variants (command / event / internal)
//! - `#[derive(State)]` - Generates a revision counter accessor for state structs
//!
//! # Example
//!
//! ```ignore
//! use taskboard_macros::Action;
//!
//! #[derive(Action, Clone, Debug)]
//! enum TaskAction {
//!     #[command]
//!     DeleteTask { request_id: Uuid, id: TaskId },
//!
//!     CommitDelete { request_id: Uuid, id: TaskId },
//!
//!     #[event]
//!     TaskDeleted { request_id: Uuid, id: TaskId, existed: bool },
//! }
//!
//! assert_eq!(action.name(), "DeleteTask");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Variant};

/// Derive macro for Action enums
///
/// Generates helper methods for action enums:
/// - `is_command()` - true for variants marked `#[command]` (public inputs)
/// - `is_event()` - true for variants marked `#[event]` (replies broadcast to callers)
/// - `is_internal()` - true for unmarked variants (steps the store sends to itself)
/// - `name()` - the variant name, for logs and metrics labels
///
/// # Attributes
///
/// - `#[command]` - Mark a variant as a command
/// - `#[event]` - Mark a variant as an event
///
/// # Errors
///
/// Produces a compile error if:
/// - Applied to a non-enum type
/// - A variant has both `#[command]` and `#[event]` attributes
#[proc_macro_derive(Action, attributes(command, event))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(&input, "#[derive(Action)] can only be used on enums")
            .to_compile_error()
            .into();
    };

    let mut command_arms = Vec::new();
    let mut event_arms = Vec::new();
    let mut name_arms = Vec::new();

    for variant in &data_enum.variants {
        let is_command = has_attribute(&variant.attrs, "command");
        let is_event = has_attribute(&variant.attrs, "event");

        if is_command && is_event {
            return syn::Error::new_spanned(variant, "Variant cannot be both #[command] and #[event]")
                .to_compile_error()
                .into();
        }

        let pattern = variant_pattern(variant);
        if is_command {
            command_arms.push(quote! { #pattern => true, });
        }
        if is_event {
            event_arms.push(quote! { #pattern => true, });
        }

        let variant_name = variant.ident.to_string();
        name_arms.push(quote! { #pattern => #variant_name, });
    }

    let expanded = quote! {
        impl #impl_generics #name #ty_generics #where_clause {
            /// Returns true if this action is a command
            #[must_use]
            #[allow(unreachable_patterns)]
            pub const fn is_command(&self) -> bool {
                match self {
                    #(#command_arms)*
                    _ => false,
                }
            }

            /// Returns true if this action is an event
            #[must_use]
            #[allow(unreachable_patterns)]
            pub const fn is_event(&self) -> bool {
                match self {
                    #(#event_arms)*
                    _ => false,
                }
            }

            /// Returns true if this action is neither a command nor an event
            #[must_use]
            pub const fn is_internal(&self) -> bool {
                !self.is_command() && !self.is_event()
            }

            /// Returns the variant name
            #[must_use]
            pub const fn name(&self) -> &'static str {
                match self {
                    #(#name_arms)*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Derive macro for State structs
///
/// Looks for a `u64` field marked `#[revision]` and generates:
/// - `revision()` - the current revision
/// - `bump_revision()` - increments the revision and returns the new value
///
/// Structs without a `#[revision]` field get no methods.
///
/// # Errors
///
/// Produces a compile error if:
/// - Applied to a non-struct type
/// - More than one field is marked `#[revision]`
/// - The marked field is unnamed
///
/// # Example
///
/// ```ignore
/// use taskboard_macros::State;
///
/// #[derive(State, Clone, Debug, Default)]
/// struct TaskState {
///     pub tasks: Vec<Task>,
///     #[revision]
///     pub revision: u64,
/// }
/// ```
#[proc_macro_derive(State, attributes(revision))]
pub fn derive_state(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data_struct) = &input.data else {
        return syn::Error::new_spanned(&input, "#[derive(State)] can only be used on structs")
            .to_compile_error()
            .into();
    };

    let mut marked = data_struct
        .fields
        .iter()
        .filter(|field| has_attribute(&field.attrs, "revision"));

    let Some(field) = marked.next() else {
        return TokenStream::new();
    };

    if let Some(extra) = marked.next() {
        return syn::Error::new_spanned(extra, "Only one field can be marked #[revision]")
            .to_compile_error()
            .into();
    }

    let Some(field_name) = field.ident.as_ref() else {
        return syn::Error::new_spanned(field, "#[revision] requires a named field")
            .to_compile_error()
            .into();
    };

    let expanded = quote! {
        impl #impl_generics #name #ty_generics #where_clause {
            /// Current revision of this state
            #[must_use]
            pub const fn revision(&self) -> u64 {
                self.#field_name
            }

            /// Increments the revision and returns the new value
            pub fn bump_revision(&mut self) -> u64 {
                self.#field_name = self.#field_name.wrapping_add(1);
                self.#field_name
            }
        }
    };

    TokenStream::from(expanded)
}

/// Builds a pattern matching any value of `variant`
fn variant_pattern(variant: &Variant) -> proc_macro2::TokenStream {
    let ident = &variant.ident;
    match &variant.fields {
        Fields::Named(_) => quote! { Self::#ident { .. } },
        Fields::Unnamed(_) => quote! { Self::#ident(..) },
        Fields::Unit => quote! { Self::#ident },
    }
}

/// Helper function to check if an attribute list contains a specific attribute
fn has_attribute(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}
