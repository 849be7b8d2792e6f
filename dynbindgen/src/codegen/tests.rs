// Unit tests for the codegen module
//
// Covers the calculator scenario end to end, the record/descriptor alignment
// invariant, the marshaling policies of the synthesizer and rendering of the
// emitted units.

use super::{
    classify::{Category, IntWidth},
    functions::*,
    map_type::{ForeignType, TargetType},
    types::{emit_types, TypeDefinition},
    TypeIndex,
};
use crate::{
    model::{
        CType, Declarations, EnumDecl, EnumMember, FieldDecl, FunctionDecl, ParamDecl, StructDecl,
    },
    Error, RustEdition,
};

fn param(name: &str, ty: CType) -> ParamDecl {
    ParamDecl::new(name, ty)
}

fn calculator() -> Declarations {
    Declarations {
        structs: vec![
            StructDecl::opaque("Calc"),
            StructDecl::new(
                "CalcConfig",
                vec![
                    FieldDecl::new("value", CType::new("double")),
                    FieldDecl::new("precision", CType::new("int32_t")),
                    FieldDecl::new("use_cache", CType::new("uint8_t")),
                ],
            ),
        ],
        enums: vec![EnumDecl::new(
            "calc_mode",
            vec![
                EnumMember::new("MODE_BASIC", None),
                EnumMember::new("MODE_SCIENTIFIC", Some(5)),
                EnumMember::new("MODE_PROGRAMMER", None),
            ],
        )],
        functions: vec![
            FunctionDecl::new(
                "calc_add",
                CType::new("double"),
                vec![
                    param("calc", CType::new("Calc")),
                    param("a", CType::new("double")),
                    param("b", CType::new("double")),
                ],
            ),
            FunctionDecl::new("calc_reset", CType::new("void"), vec![param("", CType::new("void"))]),
            FunctionDecl::new(
                "calc_new",
                CType::new("Calc"),
                vec![param("config", CType::new("CalcConfig"))],
            ),
            FunctionDecl::new(
                "calc_get_version",
                CType::pointer_to("char").with_const(),
                vec![],
            ),
            FunctionDecl::new(
                "calc_set_name",
                CType::new("void"),
                vec![
                    param("calc", CType::new("Calc")),
                    param("name", CType::pointer_to("char").with_const()),
                ],
            ),
            FunctionDecl::new(
                "calc_is_ready",
                CType::new("bool"),
                vec![param("calc", CType::new("Calc"))],
            ),
            FunctionDecl::new(
                "calc_get_mode",
                CType::new("calc_mode"),
                vec![param("calc", CType::new("Calc"))],
            ),
            FunctionDecl::new(
                "calc_get_precision",
                CType::new("char").with_unsigned(),
                vec![param("config", CType::pointer_to("CalcConfig"))],
            ),
        ],
        typedefs: vec![],
    }
}

fn synthesize_one(declarations: &Declarations, name: &str) -> FunctionBinding {
    let index = TypeIndex::new(declarations);
    let f = declarations
        .functions
        .iter()
        .find(|f| f.name == name)
        .unwrap();
    synthesize(f, &index, &SynthesisConfig::default()).unwrap()
}

fn render_functions(bindings: &[FunctionBinding], edition: RustEdition) -> String {
    let file = syn::parse2::<syn::File>(functions_tokens(bindings, edition)).unwrap();
    prettyplease::unparse(&file)
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn local(name: &str) -> CallArg {
    CallArg::Param {
        name: name.to_string(),
        policy: ArgPolicy::AddressOfLocal,
    }
}

#[test]
fn test_calc_add_registration_and_call_order() {
    let declarations = calculator();
    let binding = synthesize_one(&declarations, "calc_add");

    assert_eq!(binding.registration.symbol, "calc_add");
    assert_eq!(binding.registration.accessor, "calc_add_fn");
    assert_eq!(
        binding.registration.descriptors,
        vec![
            ForeignType::F64,
            ForeignType::Pointer,
            ForeignType::F64,
            ForeignType::F64
        ]
    );
    assert_eq!(
        binding.wrapper.call_args,
        vec![CallArg::Result, local("calc"), local("a"), local("b")]
    );
    assert_eq!(binding.wrapper.returns, TargetType::Float(super::classify::FloatWidth::F64));
    assert_eq!(binding.wrapper.return_policy, ReturnPolicy::Direct);
    assert!(!binding.wrapper.is_unsafe);
    assert_eq!(binding.wrapper.prototype, "double calc_add(Calc calc, double a, double b)");
}

#[test]
fn test_void_function_without_parameters() {
    let declarations = calculator();
    let binding = synthesize_one(&declarations, "calc_reset");

    assert_eq!(binding.registration.descriptors, vec![ForeignType::Void]);
    assert_eq!(binding.wrapper.call_args, vec![CallArg::NoResult]);
    assert_eq!(binding.wrapper.return_policy, ReturnPolicy::None);

    let text = render_functions(&[binding], RustEdition::Edition2021);
    assert!(text.contains("pub fn calc_reset(&self)"));
    assert!(text.contains("self.calc_reset_fn.call(::core::ptr::null_mut(), &mut [])"));
    assert!(!text.contains("MaybeUninit"));
}

#[test]
fn test_empty_and_void_parameter_lists_collapse() {
    let mut declarations = calculator();
    declarations.functions = vec![
        FunctionDecl::new("f_empty", CType::new("int"), vec![]),
        FunctionDecl::new("f_void", CType::new("int"), vec![param("", CType::new("void"))]),
    ];
    let empty = synthesize_one(&declarations, "f_empty");
    let void = synthesize_one(&declarations, "f_void");
    assert_eq!(empty.registration.descriptors, void.registration.descriptors);
    assert_eq!(empty.wrapper.call_args, void.wrapper.call_args);
    assert_eq!(void.wrapper.prototype, "int f_void(void)");
}

#[test]
fn test_record_fields_align_with_descriptor_elements() {
    let mut declarations = calculator();
    declarations.structs.push(StructDecl::new(
        "calc_history",
        vec![
            FieldDecl::new("entries", CType::new("double").with_array(8)),
            FieldDecl::new("count", CType::new("size_t")),
            FieldDecl::new("config", CType::new("CalcConfig")),
            FieldDecl::new("owner", CType::new("Calc")),
            FieldDecl::new("label", CType::pointer_to("char").with_const()),
        ],
    ));
    let index = TypeIndex::new(&declarations);
    let (definitions, errors) = emit_types(&declarations, &index);
    assert!(errors.is_empty(), "{errors:?}");

    let records = definitions
        .iter()
        .filter_map(|d| match d {
            TypeDefinition::Record(layout) => Some(layout),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(records.len(), 2);
    for layout in records {
        let declared = declarations
            .structs
            .iter()
            .find(|s| s.name == layout.c_name)
            .unwrap();
        assert_eq!(layout.fields.len(), layout.elements.len());
        assert_eq!(layout.fields.len(), declared.fields.len());
        for (field, declared) in layout.fields.iter().zip(&declared.fields) {
            assert_eq!(field.name, declared.name);
        }
    }

    let history = definitions
        .iter()
        .find(|d| d.name() == "CalcHistory")
        .unwrap();
    let TypeDefinition::Record(layout) = history else {
        panic!("CalcHistory should be a record");
    };
    assert_eq!(
        layout.elements,
        vec![
            ForeignType::Array(Box::new(ForeignType::F64), 8),
            ForeignType::U64,
            ForeignType::Struct("Calcconfig".into()),
            ForeignType::Pointer,
            ForeignType::Pointer,
        ]
    );
}

#[test]
fn test_narrow_u8_return_is_truncated_from_the_word() {
    let declarations = calculator();
    let binding = synthesize_one(&declarations, "calc_get_precision");
    let ReturnPolicy::Widened(narrowing) = &binding.wrapper.return_policy else {
        panic!("an 8-bit result must be received widened");
    };
    assert_eq!(narrowing.width, IntWidth::W8);
    assert!(!narrowing.signed);

    for value in 0u64..=255 {
        // Upper bits of the slot are not defined by the callee
        let word = value | 0xdead_beef_0000_0000 | (0x5a << 8);
        assert_eq!(narrowing.apply(word), value as i64);
        assert_eq!(narrowing.apply(word), word as u8 as i64);
    }

    let text = render_functions(&[binding], RustEdition::Edition2021);
    assert!(text.contains("MaybeUninit::<::libffi::raw::ffi_arg>"));
    assert!(text.contains("result as u8"));
}

#[test]
fn test_signed_and_boolean_narrowing() {
    let signed = Narrowing {
        width: IntWidth::W16,
        signed: true,
        kind: NarrowKind::Integer,
    };
    assert_eq!(signed.apply(0xffff_ffff_ffff_fffe), -2);
    assert_eq!(signed.apply(0x1234_0000_0000_7fff), 0x7fff);

    let declarations = calculator();
    let binding = synthesize_one(&declarations, "calc_is_ready");
    let ReturnPolicy::Widened(narrowing) = &binding.wrapper.return_policy else {
        panic!("a bool result must be received widened");
    };
    assert_eq!(narrowing.kind, NarrowKind::Bool);
    assert_eq!(narrowing.apply(0x0000_0001_0000_0100), 0);
    assert_eq!(narrowing.apply(0xffff_ff00_0000_0001), 1);

    let text = render_functions(&[binding], RustEdition::Edition2021);
    assert!(text.contains("(result as u8) != 0"));
}

#[test]
fn test_narrowing_follows_target_word_width() {
    let declarations = calculator();
    let index = TypeIndex::new(&declarations);
    let int = Category::Integral {
        width: IntWidth::W32,
        signed: true,
    };
    assert!(matches!(return_policy(&int, 64), ReturnPolicy::Widened(_)));
    assert_eq!(return_policy(&int, 32), ReturnPolicy::Direct);
    assert!(matches!(return_policy(&Category::Bool, 32), ReturnPolicy::Widened(_)));

    let mode = declarations
        .functions
        .iter()
        .find(|f| f.name == "calc_get_mode")
        .unwrap();
    let narrow = synthesize(mode, &index, &SynthesisConfig::default()).unwrap();
    assert_eq!(
        narrow.wrapper.return_policy,
        ReturnPolicy::Widened(Narrowing {
            width: IntWidth::W32,
            signed: true,
            kind: NarrowKind::Enum("CalcMode".into()),
        })
    );
    let wide = synthesize(
        mode,
        &index,
        &SynthesisConfig {
            word_bits: 32,
            edition: RustEdition::Edition2021,
        },
    )
    .unwrap();
    assert_eq!(wide.wrapper.return_policy, ReturnPolicy::Direct);

    let text = render_functions(&[narrow], RustEdition::Edition2021);
    assert!(text.contains("CalcMode(result as i32)"));
}

#[test]
fn test_null_string_return_becomes_empty_text() {
    let declarations = calculator();
    let binding = synthesize_one(&declarations, "calc_get_version");
    assert_eq!(binding.wrapper.return_policy, ReturnPolicy::Text);
    assert_eq!(binding.registration.descriptors, vec![ForeignType::Pointer]);

    let text = render_functions(&[binding], RustEdition::Edition2021);
    assert!(text.contains("pub fn calc_get_version(&self) -> ::std::string::String"));
    assert!(text.contains("MaybeUninit::<*const ::core::ffi::c_char>"));
    assert!(text.contains("if result.is_null() {"));
    assert!(text.contains("::std::string::String::new()"));
    assert!(text.contains("::std::ffi::CStr::from_ptr(result)"));
}

#[test]
fn test_text_parameter_passes_buffer_address() {
    let declarations = calculator();
    let binding = synthesize_one(&declarations, "calc_set_name");
    assert_eq!(
        binding.wrapper.call_args,
        vec![
            CallArg::NoResult,
            local("calc"),
            CallArg::Param {
                name: "name".into(),
                policy: ArgPolicy::TextBuffer,
            },
        ]
    );

    let text = render_functions(&[binding.clone()], RustEdition::Edition2021);
    assert!(text.contains("pub fn calc_set_name(&self, mut calc: Calc, name: &str)"));
    assert!(text.contains("let name_cstr = super::loader::text_arg(name);"));
    assert!(text.contains("let mut name_ptr = name_cstr.as_ptr();"));
    assert!(text.contains("::core::ptr::addr_of_mut!(name_ptr)"));

    let text = render_functions(&[binding], RustEdition::Edition2024);
    assert!(text.contains("(&raw mut name_ptr)"));
    assert!(text.contains("(&raw mut calc)"));
}

#[test]
fn test_struct_by_value_passes_address_of_value() {
    let declarations = calculator();
    let binding = synthesize_one(&declarations, "calc_new");
    assert_eq!(
        binding.wrapper.call_args,
        vec![
            CallArg::Result,
            CallArg::Param {
                name: "config".into(),
                policy: ArgPolicy::AddressOfValue,
            },
        ]
    );
    assert_eq!(
        binding.registration.descriptors,
        vec![ForeignType::Pointer, ForeignType::Struct("Calcconfig".into())]
    );

    let text = render_functions(&[binding], RustEdition::Edition2021);
    assert!(text.contains("(&mut config as *mut Calcconfig)"));
    assert!(text.contains("Calcconfig::ffi_type()"));
    assert!(text.contains("-> Calc {"));
}

#[test]
fn test_struct_pointer_parameter_makes_wrapper_unsafe() {
    let declarations = calculator();
    let binding = synthesize_one(&declarations, "calc_get_precision");
    assert!(binding.wrapper.is_unsafe);
    let text = render_functions(&[binding], RustEdition::Edition2021);
    assert!(text.contains("pub unsafe fn calc_get_precision("));
    assert!(text.contains("mut config: *mut ::core::ffi::c_void"));
    assert!(text.contains("# Safety"));
}

#[test]
fn test_parameter_names_do_not_clash_with_locals() {
    let mut declarations = calculator();
    declarations.functions = vec![FunctionDecl::new(
        "calc_eval",
        CType::new("double"),
        vec![
            param("result", CType::new("double")),
            param("expr", CType::pointer_to("char")),
            param("expr_cstr", CType::new("int")),
            param("type", CType::new("int")),
            param("", CType::new("int")),
        ],
    )];
    let binding = synthesize_one(&declarations, "calc_eval");
    let text = render_functions(&[binding], RustEdition::Edition2021);
    assert!(text.contains("mut result: f64"));
    assert!(text.contains("let mut result_ = ::core::mem::MaybeUninit::<f64>::uninit();"));
    assert!(text.contains("let expr_cstr_ = super::loader::text_arg(expr);"));
    assert!(text.contains("mut r#type: i32"));
    assert!(text.contains("mut arg4: i32"));
}

#[test]
fn test_failing_functions_do_not_stop_the_others() {
    let mut declarations = calculator();
    declarations.functions.push(FunctionDecl {
        variadic: true,
        ..FunctionDecl::new(
            "calc_printf",
            CType::new("int"),
            vec![param("fmt", CType::pointer_to("char").with_const())],
        )
    });
    declarations.functions.push(FunctionDecl::new(
        "calc_load",
        CType::new("quux_t"),
        vec![param("v", CType::new("void"))],
    ));
    declarations.functions.push(FunctionDecl::new("Calc_Add", CType::new("void"), vec![]));

    let index = TypeIndex::new(&declarations);
    let (bindings, errors) = synthesize_all(&declarations, &index, &SynthesisConfig::default());
    assert_eq!(bindings.len(), calculator().functions.len());
    assert_eq!(
        errors,
        vec![
            Error::UnsupportedConstruct {
                decl: "calc_printf".into(),
                construct: "variadic function".into(),
            },
            Error::UnknownType {
                decl: "calc_load".into(),
                ty: "quux_t".into(),
            },
            Error::UnsupportedConstruct {
                decl: "calc_load".into(),
                construct: "void parameter `v`".into(),
            },
            Error::DuplicateName {
                decl: "Calc_Add".into(),
                name: "calc_add".into(),
            },
        ]
    );
}

#[test]
fn test_enum_emission() {
    let mut declarations = calculator();
    declarations.enums.push(EnumDecl::new(
        "calc_status",
        vec![EnumMember::new("STATUS_ERR", Some(-2)), EnumMember::new("STATUS_WARN", None)],
    ));
    let index = TypeIndex::new(&declarations);
    let (definitions, errors) = emit_types(&declarations, &index);
    assert!(errors.is_empty());

    let mode = definitions.iter().find(|d| d.name() == "CalcMode").unwrap();
    assert_eq!(
        mode,
        &TypeDefinition::Enum {
            c_name: "calc_mode".into(),
            name: "CalcMode".into(),
            constants: vec![
                ("ModeBasic".into(), 0),
                ("ModeScientific".into(), 5),
                ("ModeProgrammer".into(), 6),
            ],
        }
    );

    let status = definitions
        .iter()
        .find(|d| d.name() == "CalcStatus")
        .unwrap();
    let file = syn::parse2::<syn::File>(status.to_tokens()).unwrap();
    let text = prettyplease::unparse(&file);
    assert!(text.contains("pub struct CalcStatus(pub i32);"));
    assert!(text.contains("pub const StatusErr: CalcStatus = CalcStatus(-2);"));
    assert!(text.contains("pub const StatusWarn: CalcStatus = CalcStatus(-1);"));
}

#[test]
fn test_type_emission_errors() {
    let declarations = Declarations {
        structs: vec![
            StructDecl::new(
                "packed_flags",
                vec![FieldDecl {
                    bit_width: Some(3),
                    ..FieldDecl::new("mode", CType::new("int"))
                }],
            ),
            StructDecl::new(
                "matrix",
                vec![FieldDecl::new("cells", CType::new("float").with_array(4).with_array(4))],
            ),
            StructDecl::opaque("Packed_Flags"),
        ],
        enums: vec![EnumDecl::new(
            "color",
            vec![EnumMember::new("RED", None), EnumMember::new("red", None)],
        )],
        ..Default::default()
    };
    let index = TypeIndex::new(&declarations);
    let (definitions, errors) = emit_types(&declarations, &index);
    assert!(definitions.is_empty());
    assert_eq!(
        errors,
        vec![
            Error::UnsupportedConstruct {
                decl: "packed_flags".into(),
                construct: "bitfield `mode: 3`".into(),
            },
            Error::UnsupportedConstruct {
                decl: "matrix".into(),
                construct: "multi-dimensional array field `cells`".into(),
            },
            Error::DuplicateName {
                decl: "Packed_Flags".into(),
                name: "PackedFlags".into(),
            },
            Error::DuplicateName {
                decl: "color".into(),
                name: "Red".into(),
            },
        ]
    );
}

#[test]
fn test_rendered_types_unit() {
    let declarations = calculator();
    let index = TypeIndex::new(&declarations);
    let (definitions, _) = emit_types(&declarations, &index);
    let tokens = definitions.iter().map(TypeDefinition::to_tokens);
    let file = syn::parse2::<syn::File>(quote::quote! { #(#tokens)* }).unwrap();
    let text = prettyplease::unparse(&file);

    assert!(text.contains("#[repr(transparent)]"));
    assert!(text.contains("pub struct Calc(pub *mut ::core::ffi::c_void);"));
    assert!(text.contains("#[repr(C)]"));
    assert!(text.contains("pub struct Calcconfig {"));
    assert!(text.contains("pub value: f64,"));
    assert!(text.contains("pub precision: i32,"));
    assert!(text.contains("pub use_cache: u8,"));
    assert!(text.contains("pub fn ffi_type() -> ::libffi::middle::Type"));
    assert!(compact(&text).contains(
        "::libffi::middle::Type::structure(::std::vec![::libffi::middle::Type::f64(),::libffi::middle::Type::i32(),::libffi::middle::Type::u8()])"
    ));
}

#[test]
fn test_functions_unit_loads_every_symbol() {
    let declarations = calculator();
    let index = TypeIndex::new(&declarations);
    let (bindings, errors) = synthesize_all(&declarations, &index, &SynthesisConfig::default());
    assert!(errors.is_empty());

    let text = render_functions(&bindings, RustEdition::Edition2021);
    assert!(text.contains("pub struct Functions {"));
    for f in &declarations.functions {
        assert!(text.contains(&format!("{}_fn: Function,", f.name)));
        assert!(compact(&text).contains(&format!("Function::prepare(library,\"{}\",", f.name)));
    }
}

#[test]
fn test_names_of_generated_items_are_reserved() {
    let declarations = Declarations {
        structs: vec![
            StructDecl::new("ok", vec![FieldDecl::new("a", CType::new("int"))]),
            StructDecl::opaque("library"),
            StructDecl::new("load_error", vec![FieldDecl::new("code", CType::new("int"))]),
        ],
        enums: vec![EnumDecl::new("option", vec![EnumMember::new("OPTION_A", None)])],
        functions: vec![
            FunctionDecl::new("load", CType::new("int"), vec![param("", CType::new("void"))]),
            FunctionDecl::new("unload", CType::new("void"), vec![]),
        ],
        ..Default::default()
    };
    let index = TypeIndex::new(&declarations);

    let (definitions, errors) = emit_types(&declarations, &index);
    assert!(definitions.is_empty());
    assert_eq!(
        errors,
        vec![
            Error::DuplicateName {
                decl: "ok".into(),
                name: "Ok".into(),
            },
            Error::DuplicateName {
                decl: "library".into(),
                name: "Library".into(),
            },
            Error::DuplicateName {
                decl: "load_error".into(),
                name: "LoadError".into(),
            },
            Error::DuplicateName {
                decl: "option".into(),
                name: "Option".into(),
            },
        ]
    );

    let (bindings, errors) = synthesize_all(&declarations, &index, &SynthesisConfig::default());
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].wrapper.name, "unload");
    assert_eq!(
        errors,
        vec![Error::DuplicateName {
            decl: "load".into(),
            name: "load".into(),
        }]
    );

    let text = compact(&render_functions(&bindings, RustEdition::Edition2021));
    assert!(text.contains("::core::result::Result::Ok(Self{"));
    assert_eq!(text.matches("pubfnload(").count(), 1);
}
