use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{
    Data, DeriveInput, Fields, Ident, LitStr, Token, Type, parse_macro_input, spanned::Spanned,
};

/// Derives `Mapped` and `Entity` for a struct stored in its own collection.
#[proc_macro_derive(Entity, attributes(entity, odm))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derives `Mapped` for embedded values and flattened base structs.
#[proc_macro_derive(Mapped, attributes(odm))]
pub fn derive_mapped(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match parse_mapped_struct(&input, "Mapped").map(|model| expand_mapped(&model)) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct MappedStruct {
    ident: Ident,
    fields: Vec<MappedField>,
}

struct MappedField {
    ident: Ident,
    ty: Type,
    options: FieldOptions,
}

#[derive(Default)]
struct FieldOptions {
    annotations: Vec<TokenStream2>,
    transient: bool,
    serialized: bool,
    flatten: bool,
}

#[derive(Default)]
struct EntityOptions {
    collection: Option<String>,
    concern: Option<Ident>,
    pre_persist: bool,
    post_persist: bool,
    post_load: bool,
}

fn parse_mapped_struct(input: &DeriveInput, derive_name: &str) -> syn::Result<MappedStruct> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            format!("{derive_name} does not support generic structs"),
        ));
    }

    let Data::Struct(data_struct) = &input.data else {
        return Err(syn::Error::new(
            input.ident.span(),
            format!("{derive_name} can only be derived for structs"),
        ));
    };

    let Fields::Named(named_fields) = &data_struct.fields else {
        return Err(syn::Error::new(
            input.ident.span(),
            format!("{derive_name} requires named fields"),
        ));
    };

    let mut fields = Vec::new();
    for field in &named_fields.named {
        let ident = field.ident.clone().ok_or_else(|| {
            syn::Error::new(field.span(), format!("{derive_name} requires named fields"))
        })?;
        let options = parse_field_options(&field.attrs)?;
        if options.flatten && (options.transient || !options.annotations.is_empty()) {
            return Err(syn::Error::new(
                field.span(),
                "#[odm(flatten)] cannot be combined with other #[odm(...)] options",
            ));
        }
        fields.push(MappedField {
            ident,
            ty: field.ty.clone(),
            options,
        });
    }

    Ok(MappedStruct {
        ident: input.ident.clone(),
        fields,
    })
}

/// Parses one `#[odm(...)]` list into annotation constructors.
///
/// Unknown options become `Annotation::Other` and are ignored by the classifier.
fn parse_field_options(attrs: &[syn::Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("odm") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let Some(ident) = meta.path.get_ident().cloned() else {
                return Err(meta.error("#[odm(...)] options are plain identifiers"));
            };
            let name = ident.unraw().to_string();

            match name.as_str() {
                "id" => {
                    options.annotations.push(quote!(::rustodm::Annotation::Id));
                }
                "transient" => {
                    options.transient = true;
                    options.annotations.push(quote!(::rustodm::Annotation::Transient));
                }
                "not_saved" => {
                    options.annotations.push(quote!(::rustodm::Annotation::NotSaved));
                }
                "flatten" => {
                    options.flatten = true;
                }
                "property" | "reference" | "embedded" | "serialized" | "version" => {
                    let key = if meta.input.peek(Token![=]) {
                        let lit: LitStr = meta.value()?.parse()?;
                        lit.value()
                    } else {
                        ".".to_string()
                    };
                    let variant = match name.as_str() {
                        "property" => quote!(Property),
                        "reference" => quote!(Reference),
                        "embedded" => quote!(Embedded),
                        "serialized" => {
                            options.serialized = true;
                            quote!(Serialized)
                        }
                        _ => quote!(Version),
                    };
                    options
                        .annotations
                        .push(quote!(::rustodm::Annotation::#variant(#key.to_string())));
                }
                "also_load" => {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    let names = content
                        .parse_terminated(<LitStr as syn::parse::Parse>::parse, Token![,])?
                        .into_iter()
                        .map(|lit| lit.value())
                        .collect::<Vec<_>>();
                    if names.is_empty() {
                        return Err(meta.error("also_load needs at least one name"));
                    }
                    options
                        .annotations
                        .push(quote!(::rustodm::Annotation::also_load([#(#names),*])));
                }
                _ => {
                    if meta.input.peek(Token![=]) {
                        meta.value()?.parse::<syn::Expr>()?;
                    } else if meta.input.peek(syn::token::Paren) {
                        let content;
                        syn::parenthesized!(content in meta.input);
                        content.parse::<TokenStream2>()?;
                    }
                    options
                        .annotations
                        .push(quote!(::rustodm::Annotation::Other(#name.to_string())));
                }
            }
            Ok(())
        })?;
    }

    Ok(options)
}

fn parse_entity_options(attrs: &[syn::Attribute]) -> syn::Result<EntityOptions> {
    let mut options = EntityOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let lit: LitStr = meta.value()?.parse()?;
                if lit.value().is_empty() {
                    return Err(syn::Error::new(lit.span(), "collection name cannot be empty"));
                }
                options.collection = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("concern") {
                let lit: LitStr = meta.value()?.parse()?;
                let variant = match lit.value().to_ascii_lowercase().as_str() {
                    "unacknowledged" | "w0" => "Unacknowledged",
                    "acknowledged" | "w1" => "Acknowledged",
                    "journaled" => "Journaled",
                    "majority" => "Majority",
                    _ => {
                        return Err(syn::Error::new(
                            lit.span(),
                            "Unknown write concern. Supported: unacknowledged, acknowledged, journaled, majority",
                        ));
                    }
                };
                options.concern = Some(Ident::new(variant, lit.span()));
                return Ok(());
            }

            if meta.path.is_ident("lifecycle") {
                return meta.parse_nested_meta(|hook| {
                    if hook.path.is_ident("pre_persist") {
                        options.pre_persist = true;
                    } else if hook.path.is_ident("post_persist") {
                        options.post_persist = true;
                    } else if hook.path.is_ident("post_load") {
                        options.post_load = true;
                    } else {
                        return Err(hook.error(
                            "Unsupported lifecycle hook. Supported: pre_persist, post_persist, post_load",
                        ));
                    }
                    Ok(())
                });
            }

            Err(meta.error(
                "Unsupported entity attribute. Supported: collection = \"...\", concern = \"...\", lifecycle(...)",
            ))
        })?;
    }

    Ok(options)
}

fn expand_mapped(model: &MappedStruct) -> TokenStream2 {
    let struct_name = &model.ident;
    let type_name = struct_name.to_string();

    let raw_fields = model.fields.iter().map(|field| {
        let name = field.ident.unraw().to_string();
        let ty = &field.ty;
        let annotations = &field.options.annotations;
        if field.options.flatten {
            return quote! {
                fields.extend(<#ty as ::rustodm::Mapped>::raw_fields());
            };
        }

        let ty_label = quote!(#ty).to_string().replace(' ', "");
        let type_info = if field.options.serialized {
            quote!(::rustodm::TypeInfo::primitive(#ty_label))
        } else if field.options.transient {
            quote!(::rustodm::TypeInfo::dynamic(#ty_label))
        } else {
            quote!(<#ty as ::rustodm::MappedType>::type_info())
        };
        quote! {
            fields.push(
                ::rustodm::RawField::new(#name, #type_name, #type_info)
                    .with_annotations(vec![#(#annotations),*]),
            );
        }
    });

    let writes = model.fields.iter().filter(|f| !f.options.transient).map(|field| {
        let ident = &field.ident;
        let name = ident.unraw().to_string();
        if field.options.flatten {
            quote!(::rustodm::Mapped::write_fields(&self.#ident, out)?;)
        } else if field.options.serialized {
            quote!(out.insert(#name.to_string(), ::rustodm::codec::to_blob(#name, &self.#ident)?);)
        } else {
            quote!(out.insert(#name.to_string(), ::rustodm::codec::to_value(#name, &self.#ident)?);)
        }
    });

    let reads = model.fields.iter().map(|field| {
        let ident = &field.ident;
        let ty = &field.ty;
        let name = ident.unraw().to_string();
        if field.options.flatten {
            quote!(#ident: <#ty as ::rustodm::Mapped>::read_fields(values)?)
        } else if field.options.transient {
            quote!(#ident: ::core::default::Default::default())
        } else if field.options.serialized {
            quote!(#ident: ::rustodm::codec::take_blob(values, #name)?)
        } else {
            quote!(#ident: ::rustodm::codec::take_value(values, #name)?)
        }
    });

    let value_arms = model
        .fields
        .iter()
        .filter(|f| !f.options.transient && !f.options.flatten)
        .map(|field| {
            let ident = &field.ident;
            let name = ident.unraw().to_string();
            if field.options.serialized {
                quote!(#name => ::rustodm::codec::to_blob(#name, &self.#ident).map(Some),)
            } else {
                quote!(#name => ::rustodm::codec::to_value(#name, &self.#ident).map(Some),)
            }
        });

    let flattened_lookups = model.fields.iter().filter(|f| f.options.flatten).map(|field| {
        let ident = &field.ident;
        quote! {
            if let Some(value) = ::rustodm::Mapped::field_value(&self.#ident, declared_name)? {
                return Ok(Some(value));
            }
        }
    });

    quote! {
        impl ::rustodm::MappedType for #struct_name {
            fn type_info() -> ::rustodm::TypeInfo {
                ::rustodm::TypeInfo::embedded(#type_name)
            }
        }

        impl ::rustodm::Mapped for #struct_name {
            fn raw_fields() -> Vec<::rustodm::RawField> {
                let mut fields = Vec::new();
                #(#raw_fields)*
                fields
            }

            fn write_fields(&self, out: &mut ::rustodm::Document) -> ::rustodm::Result<()> {
                #(#writes)*
                Ok(())
            }

            fn read_fields(values: &mut ::rustodm::Document) -> ::rustodm::Result<Self> {
                Ok(Self {
                    #(#reads),*
                })
            }

            fn field_value(
                &self,
                declared_name: &str,
            ) -> ::rustodm::Result<Option<::rustodm::Value>> {
                match declared_name {
                    #(#value_arms)*
                    _ => {
                        #(#flattened_lookups)*
                        Ok(None)
                    }
                }
            }
        }
    }
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let model = parse_mapped_struct(&input, "Entity")?;
    let options = parse_entity_options(&input.attrs)?;
    let struct_name = &model.ident;
    let type_name = struct_name.to_string();
    let mapped = expand_mapped(&model);

    let collection = options
        .collection
        .as_ref()
        .map(|collection| quote!(.with_collection(#collection)));
    let concern = options
        .concern
        .as_ref()
        .map(|variant| quote!(.with_write_concern(::rustodm::WriteConcern::#variant)));
    let (pre_persist, post_persist, post_load) =
        (options.pre_persist, options.post_persist, options.post_load);

    let pre_persist_hook = pre_persist.then(|| {
        quote! {
            fn pre_persist(&self, document: &mut ::rustodm::Document) -> ::rustodm::Result<()> {
                <Self as ::rustodm::EntityLifecycle>::pre_persist(self, document)
            }
        }
    });
    let post_persist_hook = post_persist.then(|| {
        quote! {
            fn post_persist(&self, document: &::rustodm::Document) -> ::rustodm::Result<()> {
                <Self as ::rustodm::EntityLifecycle>::post_persist(self, document)
            }
        }
    });
    let post_load_hook = post_load.then(|| {
        quote! {
            fn post_load(&mut self, document: &::rustodm::Document) -> ::rustodm::Result<()> {
                <Self as ::rustodm::EntityLifecycle>::post_load(self, document)
            }
        }
    });

    Ok(quote! {
        #mapped

        impl ::rustodm::Entity for #struct_name {
            fn entity_mapping() -> ::rustodm::EntityMapping {
                ::rustodm::EntityMapping::new(
                    #type_name,
                    <Self as ::rustodm::Mapped>::raw_fields(),
                )
                #collection
                #concern
                .with_lifecycle(::rustodm::LifecycleBindings {
                    pre_persist: #pre_persist,
                    post_persist: #post_persist,
                    post_load: #post_load,
                })
            }

            #pre_persist_hook
            #post_persist_hook
            #post_load_hook
        }
    })
}
