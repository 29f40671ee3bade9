extern crate proc_macro;

use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::spanned::Spanned;
use syn::{
    parse_macro_input, parse_quote, Data, DeriveInput, Expr, Field, Fields, GenericParam,
    Generics, LitStr, Type,
};

/// Derives `eventdata::Record` for a struct with named fields.
///
/// Fields are decoded in declaration order. Field attributes:
///
/// - `#[event_data(count = N)]`: `Vec<T>` or `[T; N]` field holding exactly
///   `N` elements.
/// - `#[event_data(length = "field")]`: `Vec<T>` field whose element count is
///   the value of the earlier integer field `field`.
/// - `#[event_data(pointer)]`: the scalar (or array element) is pointer
///   sized.
/// - `#[event_data(skip)]`: not part of the wire layout.
///
/// The struct level `#[event_data(name = "...")]` sets the record name,
/// which defaults to the struct name.
#[proc_macro_derive(Record, attributes(event_data))]
pub fn derive_record(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let record_name = record_name(&input)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new(
                    input.span(),
                    "Record can only be derived for structs with named fields",
                ))
            }
        },
        Data::Enum(_) | Data::Union(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Record can only be derived for structs",
            ))
        }
    };

    let mut layout = Vec::new();
    for field in fields {
        let attrs = FieldAttrs::parse(field)?;
        if !attrs.skip {
            layout.push((field, attrs));
        }
    }
    check_length_fields(&layout)?;

    let declarations = layout
        .iter()
        .map(|(field, attrs)| declaration(field, attrs))
        .collect::<syn::Result<Vec<_>>>()?;
    let slots = layout.iter().enumerate().map(|(index, (field, _))| {
        let ident = &field.ident;
        quote! {
            #index => ::std::option::Option::Some(::eventdata::FieldValue::slot(&mut self.#ident)),
        }
    });

    let generics = add_trait_bounds(input.generics.clone());
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::eventdata::Record for #name #ty_generics #where_clause {
            fn record_name() -> &'static str {
                #record_name
            }

            #[allow(unused_variables)]
            fn declare(schema: &mut ::eventdata::SchemaBuilder) {
                #(#declarations)*
            }
        }

        impl #impl_generics ::eventdata::Populate for #name #ty_generics #where_clause {
            fn slot(&mut self, index: usize) -> ::std::option::Option<::eventdata::Slot<'_>> {
                match index {
                    #(#slots)*
                    _ => ::std::option::Option::None,
                }
            }
        }

        impl #impl_generics ::eventdata::FieldValue for #name #ty_generics #where_clause {
            fn slot(&mut self) -> ::eventdata::Slot<'_> {
                ::eventdata::Slot::Record(self)
            }
        }

        impl #impl_generics ::eventdata::FieldType for #name #ty_generics #where_clause {
            fn element_type() -> ::eventdata::ElementType {
                ::eventdata::ElementType::record::<Self>()
            }
        }
    })
}

// Add the bounds a field of type `T` needs to every type parameter T.
fn add_trait_bounds(mut generics: Generics) -> Generics {
    for param in &mut generics.params {
        if let GenericParam::Type(ref mut type_param) = *param {
            type_param
                .bounds
                .push(parse_quote!(::eventdata::FieldValue));
            type_param
                .bounds
                .push(parse_quote!(::eventdata::FieldType));
            type_param.bounds.push(parse_quote!('static));
        }
    }
    generics
}

fn record_name(input: &DeriveInput) -> syn::Result<String> {
    let mut name = input.ident.to_string();
    for attr in &input.attrs {
        if !attr.path().is_ident("event_data") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = meta.value()?.parse::<LitStr>()?.value();
                Ok(())
            } else {
                Err(meta.error("unsupported record attribute, expected `name`"))
            }
        })?;
    }
    Ok(name)
}

#[derive(Default)]
struct FieldAttrs {
    count: Option<Expr>,
    length: Option<LitStr>,
    pointer: bool,
    skip: bool,
}

impl FieldAttrs {
    fn parse(field: &Field) -> syn::Result<Self> {
        let mut attrs = FieldAttrs::default();
        for attr in &field.attrs {
            if !attr.path().is_ident("event_data") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("count") {
                    attrs.count = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("length") {
                    attrs.length = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("pointer") {
                    attrs.pointer = true;
                } else if meta.path.is_ident("skip") {
                    attrs.skip = true;
                } else {
                    return Err(meta.error(
                        "unsupported field attribute, expected `count`, `length`, `pointer` or `skip`",
                    ));
                }
                Ok(())
            })?;
        }
        Ok(attrs)
    }
}

/// Length fields must name an earlier field of the layout.
fn check_length_fields(layout: &[(&Field, FieldAttrs)]) -> syn::Result<()> {
    for (pos, (_, attrs)) in layout.iter().enumerate() {
        let Some(length) = &attrs.length else {
            continue;
        };
        let target = length.value();
        let declared_before = layout[..pos]
            .iter()
            .any(|(f, _)| f.ident.as_ref().is_some_and(|i| *i == target));
        if !declared_before {
            return Err(syn::Error::new(
                length.span(),
                format!("length field `{target}` must be declared before this field"),
            ));
        }
    }
    Ok(())
}

fn is_vec(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|seg| seg.ident == "Vec"),
        _ => false,
    }
}

// Generate the `SchemaBuilder` call declaring one field.
fn declaration(field: &Field, attrs: &FieldAttrs) -> syn::Result<TokenStream> {
    let ty = &field.ty;
    let name = field
        .ident
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();

    let element = if attrs.pointer {
        quote! { ::eventdata::ElementType::Scalar(::eventdata::ScalarRepr::Pointer) }
    } else {
        quote! { <<#ty as ::eventdata::ArrayType>::Element as ::eventdata::FieldType>::element_type() }
    };

    let tokens = match (&attrs.count, &attrs.length, ty) {
        (Some(count), None, _) => quote_spanned! {field.span() =>
            schema.fixed_array(#name, #element, (#count) as i64);
        },
        (None, Some(length), _) => quote_spanned! {field.span() =>
            schema.variable_array(#name, #element, #length);
        },
        (None, None, Type::Array(array)) => {
            let len = &array.len;
            quote_spanned! {field.span() =>
                schema.fixed_array(#name, #element, (#len) as i64);
            }
        }
        (None, None, ty) if is_vec(ty) => {
            return Err(syn::Error::new(
                field.span(),
                "Vec fields need `#[event_data(count = ...)]` or `#[event_data(length = \"...\")]`",
            ))
        }
        (None, None, ty) => {
            let element = if attrs.pointer {
                element
            } else {
                quote! { <#ty as ::eventdata::FieldType>::element_type() }
            };
            quote_spanned! {field.span() =>
                schema.field(#name, #element);
            }
        }
        (Some(_), Some(_), _) => {
            return Err(syn::Error::new(
                field.span(),
                "`count` and `length` cannot be used together",
            ))
        }
    };
    Ok(tokens)
}
