use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, Visibility, parse_macro_input};

/// Derive macro generating a struct's field table.
///
/// Implements `Bindable`, `FieldType` and `Record` from `fieldbind_api` for
/// the annotated struct. Only `pub` fields are bindable.
///
/// Field attributes:
///
/// - `#[tag(json = "user_name", orm = "name")]`: any number of named tags;
///   the binder consults them in its configured priority order.
/// - `#[bind(embed)]` promotes the nested struct's fields into this one.
/// - `#[bind(skip)]` leaves the field out of the table.
///
/// The struct must implement `Clone` and `Default`.
///
/// # Example
///
/// ```ignore
/// #[derive(Bind, Clone, Default)]
/// pub struct User {
///     #[tag(json = "user_name")]
///     pub name: String,
///
///     #[bind(embed)]
///     pub audit: Audit,
/// }
/// ```
#[proc_macro_derive(Bind, attributes(bind, tag))]
pub fn derive_bind(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

struct BindField<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    index: usize,
    embed: bool,
    tags: Vec<(String, String)>,
}

fn derive_impl(input: &DeriveInput) -> Result<proc_macro2::TokenStream, syn::Error> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Bind does not support generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Bind only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "Bind only supports structs")),
    };

    let mut bind_fields = Vec::new();

    for (index, field) in fields.iter().enumerate() {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;

        let mut skip = false;
        let mut embed = false;
        let mut tags = Vec::new();

        for attr in &field.attrs {
            if attr.path().is_ident("bind") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("skip") {
                        skip = true;
                    } else if meta.path.is_ident("embed") {
                        embed = true;
                    } else {
                        return Err(meta.error("unknown bind option (expected `skip` or `embed`)"));
                    }
                    Ok(())
                })?;
            } else if attr.path().is_ident("tag") {
                attr.parse_nested_meta(|meta| {
                    let key = meta
                        .path
                        .get_ident()
                        .map(|ident| unraw(&ident.to_string()))
                        .ok_or_else(|| meta.error("tag name must be a plain identifier"))?;
                    let value: LitStr = meta.value()?.parse()?;
                    tags.push((key, value.value()));
                    Ok(())
                })?;
            }
        }

        // Private fields are invisible to binding, like skipped ones.
        if skip || !matches!(field.vis, Visibility::Public(_)) {
            continue;
        }

        bind_fields.push(BindField { ident, ty: &field.ty, index, embed, tags });
    }

    let field_defs = bind_fields.iter().map(|f| {
        let ty = f.ty;
        let index = f.index;
        let embed = f.embed;
        let name_str = unraw(&f.ident.to_string());
        let keys = f.tags.iter().map(|(k, _)| k);
        let values = f.tags.iter().map(|(_, v)| v);
        quote! {
            fieldbind_api::FieldDef::of::<#ty>(#name_str, #index, &[#((#keys, #values)),*], #embed)
        }
    });

    let to_value = bind_fields.iter().map(|f| {
        let ident = f.ident;
        if f.embed {
            quote! {
                if let fieldbind_api::Value::Map(inner) = fieldbind_api::Bindable::to_value(&self.#ident) {
                    for (key, value) in inner {
                        map.entry(key).or_insert(value);
                    }
                }
            }
        } else {
            let name_str = unraw(&ident.to_string());
            quote! {
                map.entry(::std::string::String::from(#name_str))
                    .or_insert_with(|| fieldbind_api::Bindable::to_value(&self.#ident));
            }
        }
    });

    let field_arms = bind_fields.iter().map(|f| {
        let ident = f.ident;
        let index = f.index;
        quote! { #index => ::std::option::Option::Some(&self.#ident as &dyn fieldbind_api::Bindable) }
    });

    let field_mut_arms = bind_fields.iter().map(|f| {
        let ident = f.ident;
        let index = f.index;
        quote! { #index => ::std::option::Option::Some(&mut self.#ident as &mut dyn fieldbind_api::Bindable) }
    });

    let expanded = quote! {
        impl #name {
            #[doc(hidden)]
            fn __fieldbind_fields() -> ::std::vec::Vec<fieldbind_api::FieldDef> {
                ::std::vec![#(#field_defs),*]
            }
        }

        impl fieldbind_api::Bindable for #name {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn inner_any_mut(&mut self) -> ::std::option::Option<&mut dyn ::std::any::Any> {
                ::std::option::Option::Some(self)
            }

            fn to_value(&self) -> fieldbind_api::Value {
                let mut map = fieldbind_api::value::Map::new();
                #(#to_value)*
                fieldbind_api::Value::Map(map)
            }

            fn set_zero(&mut self) {
                *self = <Self as ::std::default::Default>::default();
            }

            fn copy_from(&mut self, source: &dyn ::std::any::Any) -> bool {
                fieldbind_api::bindable::copy_clone(self, source)
            }

            fn assign(
                &mut self,
                value: &fieldbind_api::Value,
                cx: &dyn fieldbind_api::BindContext,
            ) -> ::std::result::Result<(), fieldbind_api::BindError> {
                cx.bind_struct(value, self)
            }

            fn shape(&self) -> ::std::option::Option<fieldbind_api::Shape> {
                <Self as fieldbind_api::FieldType>::static_shape()
            }

            fn record(&self) -> ::std::option::Option<&dyn fieldbind_api::Record> {
                ::std::option::Option::Some(self)
            }

            fn record_mut(&mut self) -> ::std::option::Option<&mut dyn fieldbind_api::Record> {
                ::std::option::Option::Some(self)
            }
        }

        impl fieldbind_api::FieldType for #name {
            fn kind() -> fieldbind_api::FieldKind {
                fieldbind_api::FieldKind::Struct
            }

            fn static_shape() -> ::std::option::Option<fieldbind_api::Shape> {
                ::std::option::Option::Some(fieldbind_api::Shape {
                    type_name: ::std::any::type_name::<#name>(),
                    type_id: ::std::any::TypeId::of::<#name>,
                    fields: #name::__fieldbind_fields,
                })
            }
        }

        impl fieldbind_api::Record for #name {
            fn field(&self, index: usize) -> ::std::option::Option<&dyn fieldbind_api::Bindable> {
                match index {
                    #(#field_arms,)*
                    _ => ::std::option::Option::None,
                }
            }

            fn field_mut(&mut self, index: usize) -> ::std::option::Option<&mut dyn fieldbind_api::Bindable> {
                match index {
                    #(#field_mut_arms,)*
                    _ => ::std::option::Option::None,
                }
            }
        }
    };

    Ok(expanded)
}

/// `r#type` → `type`.
fn unraw(name: &str) -> String {
    name.strip_prefix("r#").unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn expands_public_fields_with_tags() {
        let input: DeriveInput = parse_quote! {
            pub struct User {
                #[tag(json = "user_name")]
                pub name: String,
                secret: String,
            }
        };
        let expanded = derive_impl(&input).unwrap().to_string();
        assert!(expanded.contains("Record for User"));
        assert!(expanded.contains("\"user_name\""));
        assert!(!expanded.contains("secret"));
    }

    #[test]
    fn rejects_generic_and_tuple_structs() {
        let generic: DeriveInput = parse_quote! { pub struct Wrap<T> { pub inner: T } };
        let err = derive_impl(&generic).unwrap_err();
        assert!(err.to_string().contains("generic"));

        let tuple: DeriveInput = parse_quote! { pub struct Pair(pub i64, pub i64); };
        let err = derive_impl(&tuple).unwrap_err();
        assert!(err.to_string().contains("named fields"));
    }

    #[test]
    fn rejects_unknown_bind_option() {
        let input: DeriveInput = parse_quote! {
            pub struct User {
                #[bind(flatten)]
                pub name: String,
            }
        };
        assert!(derive_impl(&input).is_err());
    }
}
