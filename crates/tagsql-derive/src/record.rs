//! Record derive macro implementation

mod attrs;

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields, Result};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;

    // The field table is a `static`, which cannot mention generic parameters.
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Record can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Record can only be derived for structs",
            ));
        }
    };

    let table = attrs::get_table_name(&input)?;

    let mut accessors = Vec::new();
    let mut descriptors = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        let tags = attrs::get_tags(field)?;
        if tags.is_empty() {
            continue;
        }
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let ident_name = field_ident.unraw().to_string();
        let getter = format_ident!("__tagsql_get_{}", index);
        let namespaces = tags.iter().map(|(ns, _)| ns);
        let raw_tags = tags.iter().map(|(_, tag)| tag);

        accessors.push(quote! {
            fn #getter(record: &#name) -> &dyn tagsql::ToValue {
                &record.#field_ident
            }
        });
        descriptors.push(quote! {
            tagsql::FieldDescriptor {
                ident: #ident_name,
                tags: &[#((#namespaces, #raw_tags)),*],
                get: #getter,
            }
        });
    }
    let count = descriptors.len();

    Ok(quote! {
        impl tagsql::Record for #name {
            const TABLE: &'static str = #table;

            fn fields() -> &'static [tagsql::FieldDescriptor<Self>] {
                #(#accessors)*

                static FIELDS: [tagsql::FieldDescriptor<#name>; #count] = [
                    #(#descriptors),*
                ];
                &FIELDS
            }
        }
    })
}
