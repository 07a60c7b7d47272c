//! Procedural macros for the ironstep workflow runtime.
//!
//! # Properties Derive Macro
//!
//! Exposes struct fields as properties that parameter expressions such as
//! `@Approver` or `@Root.Amount` can reference.
//!
//! ## Usage
//!
//! ```ignore
//! #[derive(Default, Properties)]
//! struct Review {
//!     approver: String,          // property `Approver`
//!     #[property(rename = "Limit")]
//!     max_amount: i64,           // property `Limit`
//!     #[property(skip)]
//!     cache: Vec<u8>,            // not exposed
//! }
//! ```
//!
//! # ParamEnum Derive Macro
//!
//! Lets unit enums bind from parameter values by member name or index.
//!
//! ```ignore
//! #[derive(Debug, Clone, Copy, ParamEnum)]
//! enum Priority {
//!     Low,
//!     Normal,
//!     High,
//! }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Fields, Ident, LitStr, parse_macro_input, spanned::Spanned,
};

/// Derives `Properties` for a struct with named fields.
///
/// Field names are exposed in PascalCase. Use `#[property(rename = "Name")]`
/// to pick another name and `#[property(skip)]` to hide a field. Every
/// exposed field type must implement `ToParam`.
#[proc_macro_derive(Properties, attributes(property))]
pub fn derive_properties(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_properties_impl(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_properties_impl(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let data = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "Properties can only be derived for structs",
            ));
        }
    };

    let mut names = Vec::new();
    let mut fields = Vec::new();

    match &data.fields {
        Fields::Named(named) => {
            for field in &named.named {
                let Some(ident) = field.ident.as_ref() else {
                    continue;
                };
                let Some(property) = property_name(ident, &field.attrs)? else {
                    continue;
                };
                if names.contains(&property) {
                    return Err(syn::Error::new(
                        field.span(),
                        format!("Property `{property}` is exposed more than once"),
                    ));
                }
                names.push(property);
                fields.push(ident.clone());
            }
        }
        Fields::Unit => {}
        Fields::Unnamed(_) => {
            return Err(syn::Error::new(
                data.fields.span(),
                "Properties derive does not support tuple structs. Use named fields instead.",
            ));
        }
    }

    Ok(quote! {
        impl #impl_generics ::ironstep::param::Properties for #name #ty_generics #where_clause {
            fn property(&self, name: &str) -> ::core::option::Option<::ironstep::ParamValue> {
                match name {
                    #(#names => ::core::option::Option::Some(::ironstep::ToParam::to_param(&self.#fields)),)*
                    _ => ::core::option::Option::None,
                }
            }

            fn property_names(&self) -> &'static [&'static str] {
                &[#(#names),*]
            }
        }
    })
}

/// Resolve the exposed name of a field; `None` if the field is skipped.
fn property_name(field: &Ident, attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;
    let mut skip = false;

    for attr in attrs {
        if !attr.path().is_ident("property") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().is_empty() {
                    return Err(meta.error("property name must not be empty"));
                }
                rename = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `rename = \"...\"` or `skip`"))
            }
        })?;
    }

    if skip {
        return Ok(None);
    }
    Ok(Some(rename.unwrap_or_else(|| pascal_case(&field.to_string()))))
}

/// `max_amount` → `MaxAmount`; raw identifiers lose their `r#` prefix.
fn pascal_case(name: &str) -> String {
    name.trim_start_matches("r#")
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Derives `ParamEnum`, `FromParam` and `ToParam` for a unit enum.
///
/// Members bind from their name (case-insensitively) or their zero-based
/// declaration index, and convert to their name as text.
#[proc_macro_derive(ParamEnum)]
pub fn derive_param_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_param_enum_impl(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_param_enum_impl(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "ParamEnum cannot be derived for generic enums",
        ));
    }

    let data = match &input.data {
        Data::Enum(data) => data,
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "ParamEnum can only be derived for enums",
            ));
        }
    };

    if data.variants.is_empty() {
        return Err(syn::Error::new(
            input.span(),
            "ParamEnum requires at least one variant",
        ));
    }

    let mut variants = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new(
                variant.span(),
                format!(
                    "Variant `{}` has fields. ParamEnum only supports unit variants.",
                    variant.ident
                ),
            ));
        }
        variants.push(&variant.ident);
    }
    let names: Vec<String> = variants.iter().map(|v| v.to_string()).collect();
    let from_name_arms = variants.iter().zip(&names).map(|(variant, label)| {
        quote! { #label => ::core::option::Option::Some(#name::#variant), }
    });
    let name_arms = variants.iter().zip(&names).map(|(variant, label)| {
        quote! { #name::#variant => #label, }
    });

    Ok(quote! {
        impl ::ironstep::param::ParamEnum for #name {
            const VARIANTS: &'static [&'static str] = &[#(#names),*];

            fn from_name(name: &str) -> ::core::option::Option<Self> {
                match name {
                    #(#from_name_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            fn name(&self) -> &'static str {
                match self {
                    #(#name_arms)*
                }
            }
        }

        impl ::ironstep::param::FromParam for #name {
            fn from_param(
                value: ::ironstep::ParamValue,
            ) -> ::core::result::Result<Self, ::std::string::String> {
                ::ironstep::param::enum_from_param(value)
            }
        }

        impl ::ironstep::param::ToParam for #name {
            fn to_param(&self) -> ::ironstep::ParamValue {
                ::ironstep::ParamValue::Text(
                    ::std::string::ToString::to_string(
                        <Self as ::ironstep::param::ParamEnum>::name(self),
                    ),
                )
            }
        }
    })
}
