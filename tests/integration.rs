//! End-to-end exercises of the public API: query, mutate, validate, and
//! the modifier pipeline over realistic documents.

use xmlpath::{Error, Kind, Options, SetValue};

const CATALOG: &str = concat!(
    "<catalog>",
    "<book id=\"bk101\" status=\"active\"><title>XML Guide</title><price>44.99</price></book>",
    "<book id=\"bk102\" status=\"retired\"><title>Old Manual</title><price>19.99</price></book>",
    "<book id=\"bk103\" status=\"active\"><title>Rust Primer</title><price>29.99</price></book>",
    "</catalog>"
);

#[test]
fn query_basic_paths() {
    assert_eq!(xmlpath::get(CATALOG, "catalog.book.title").as_str(), "XML Guide");
    assert_eq!(xmlpath::get(CATALOG, "catalog.book.1.title").as_str(), "Old Manual");
    assert_eq!(xmlpath::get(CATALOG, "catalog.book.@id").as_str(), "bk101");
    assert_eq!(xmlpath::get(CATALOG, "catalog.book.#").i64(), 3);
    assert!(!xmlpath::get(CATALOG, "catalog.missing").exists());
}

#[test]
fn query_filters() {
    assert_eq!(
        xmlpath::get(CATALOG, "catalog.book.#(status==retired).title").as_str(),
        "Old Manual"
    );
    assert_eq!(
        xmlpath::get(CATALOG, "catalog.book.#(price<25).title").as_str(),
        "Old Manual"
    );
    let active = xmlpath::get(CATALOG, "catalog.book.#(status==active)#.title");
    assert_eq!(active.kind, Kind::Array);
    assert_eq!(active.members().len(), 2);
    assert_eq!(active.members()[1].as_str(), "Rust Primer");
}

#[test]
fn query_field_extraction_with_modifiers() {
    let titles = xmlpath::get(CATALOG, "catalog.book.#.title");
    assert_eq!(titles.members().len(), 3);

    let sorted = xmlpath::get(CATALOG, "catalog.book.#.price|@sort|@last");
    assert_eq!(sorted.as_str(), "44.99");

    let reversed = xmlpath::get(CATALOG, "catalog.book.#.@id|@reverse|@first");
    assert_eq!(reversed.as_str(), "bk103");
}

#[test]
fn get_after_set_roundtrip() {
    let updated = xmlpath::set(CATALOG, "catalog.book.1.price", "24.99").unwrap();
    assert_eq!(xmlpath::get(&updated, "catalog.book.1.price").as_str(), "24.99");
    // untouched siblings still read back
    assert_eq!(xmlpath::get(&updated, "catalog.book.0.price").as_str(), "44.99");
    assert_eq!(xmlpath::get(CATALOG, "catalog.book.1.price").as_str(), "19.99");
}

#[test]
fn set_creates_intermediate_elements() {
    let out = xmlpath::set("<shop/>", "shop.inventory.count", 7i64).unwrap();
    assert_eq!(out, "<shop><inventory><count>7</count></inventory></shop>");
    assert_eq!(xmlpath::get(&out, "shop.inventory.count").i64(), 7);
}

#[test]
fn sequential_appends_keep_order() {
    let mut doc = "<root></root>".to_string();
    for v in ["a", "b", "c"] {
        doc = xmlpath::set(&doc, "root.item.-1", v).unwrap();
    }
    assert_eq!(xmlpath::get(&doc, "root.item.#").i64(), 3);
    assert_eq!(xmlpath::get(&doc, "root.item.0").as_str(), "a");
    assert_eq!(xmlpath::get(&doc, "root.item.2").as_str(), "c");
}

#[test]
fn attribute_output_is_deterministic() {
    let a = xmlpath::set("<r><i b=\"2\" a=\"1\">x</i></r>", "r.i.@c", "3").unwrap();
    assert_eq!(a, "<r><i a=\"1\" b=\"2\" c=\"3\">x</i></r>");
    // setting the same attribute twice produces identical bytes
    let b = xmlpath::set(&a, "r.i.@c", "3").unwrap();
    assert_eq!(a, b);
}

#[test]
fn delete_absent_is_byte_identical() {
    let out = xmlpath::delete(CATALOG, "catalog.nothing.here").unwrap();
    assert_eq!(out, CATALOG);
}

#[test]
fn delete_element_and_attribute() {
    let out = xmlpath::delete(CATALOG, "catalog.book.1").unwrap();
    assert_eq!(xmlpath::get(&out, "catalog.book.#").i64(), 2);
    assert_eq!(xmlpath::get(&out, "catalog.book.1.title").as_str(), "Rust Primer");

    let out = xmlpath::delete(CATALOG, "catalog.book.0.@status").unwrap();
    assert!(!xmlpath::get(&out, "catalog.book.0.@status").exists());
    assert_eq!(xmlpath::get(&out, "catalog.book.0.@id").as_str(), "bk101");
}

#[test]
fn mutation_rejects_malformed_document() {
    let err = xmlpath::set("<root><item>", "root.item", "x").unwrap_err();
    assert!(matches!(err, Error::MalformedDocument(_)));

    let v = xmlpath::validate("<root><item>");
    assert!(!v.ok);
    assert!(v.line >= 1);
}

#[test]
fn reserved_negative_index_rejected() {
    let err = xmlpath::set("<r><i>x</i></r>", "r.i.-2", "v").unwrap_err();
    match err {
        Error::InvalidPath(msg) => assert!(msg.contains("reserved")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn set_many_applies_in_order() {
    let out = xmlpath::set_many(
        "<cfg/>",
        &["cfg.host", "cfg.port", "cfg.host"],
        &[
            SetValue::Text("localhost".into()),
            SetValue::Int(8080),
            SetValue::Text("example.com".into()),
        ],
    )
    .unwrap();
    assert_eq!(xmlpath::get(&out, "cfg.host").as_str(), "example.com");
    assert_eq!(xmlpath::get(&out, "cfg.port").i64(), 8080);

    let err = xmlpath::set_many("<cfg/>", &["cfg.a"], &[]).unwrap_err();
    assert!(matches!(err, Error::InvalidPath(_)));
}

#[test]
fn delete_many() {
    let out = xmlpath::delete_many(CATALOG, &["catalog.book.2", "catalog.book.1"]).unwrap();
    assert_eq!(xmlpath::get(&out, "catalog.book.#").i64(), 1);
}

#[test]
fn raw_fragment_roundtrip() {
    let out = xmlpath::set_raw("<r><t>x</t></r>", "r.t", "<b>bold</b> text").unwrap();
    let v = xmlpath::get(&out, "r.t");
    assert_eq!(v.kind, Kind::Element);
    assert_eq!(xmlpath::get(&out, "r.t.b").as_str(), "bold");

    let err = xmlpath::set_raw("<r><t>x</t></r>", "r.t", "<b>unbalanced").unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));
}

#[test]
fn entities_survive_write_read() {
    let out = xmlpath::set("<r><t>x</t></r>", "r.t", "5 < 6 & \"quoted\"").unwrap();
    assert_eq!(xmlpath::get(&out, "r.t").as_str(), "5 < 6 & \"quoted\"");
    assert!(out.contains("&lt;"));
}

#[test]
fn case_insensitive_options() {
    let doc = "<Config><Host>example</Host></Config>";
    let opts = Options {
        case_sensitive: false,
        ..Options::default()
    };
    assert_eq!(xmlpath::get_with(doc, "config.host", &opts).as_str(), "example");
    assert!(!xmlpath::get(doc, "config.host").exists());
}

#[test]
fn namespace_prefixes_match_literally() {
    let doc = "<soap:Envelope><soap:Body><m:GetPrice>42</m:GetPrice></soap:Body></soap:Envelope>";
    let mut opts = Options::default();
    opts.namespaces.insert(
        "soap".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    // Declarations are advisory; prefixed segments match as written
    let v = xmlpath::get_with(doc, "soap:Envelope.soap:Body.m:GetPrice", &opts);
    assert_eq!(v.i64(), 42);
    assert_eq!(
        xmlpath::get(doc, "soap:Envelope.soap:Body.m:GetPrice").i64(),
        42
    );
    assert!(!xmlpath::get_with(doc, "Envelope.Body.GetPrice", &opts).exists());
}

#[test]
fn count_is_not_truncated() {
    let mut doc = String::from("<r>");
    for _ in 0..12_000 {
        doc.push_str("<i/>");
    }
    doc.push_str("</r>");
    assert_eq!(xmlpath::get(&doc, "r.i.#").i64(), 12_000);
}

#[test]
fn get_many_pairs_with_paths() {
    let results = xmlpath::get_many(
        CATALOG,
        &["catalog.book.title", "catalog.book.#", "catalog.zzz"],
    );
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_str(), "XML Guide");
    assert_eq!(results[1].i64(), 3);
    assert!(!results[2].exists());
}

#[test]
fn wildcard_and_recursive_queries() {
    let doc = "<r><a><name>x</name></a><b><c><name>y</name></c></b></r>";
    let all = xmlpath::get(doc, "r.**.name");
    assert_eq!(all.members().len(), 2);
    assert_eq!(all.members()[0].as_str(), "x");

    let direct = xmlpath::get(doc, "r.*");
    assert_eq!(direct.members().len(), 2);
}

#[test]
fn wildcard_results_are_bounded() {
    let mut doc = String::from("<r>");
    for i in 0..12_000 {
        doc.push_str(&format!("<i>{i}</i>"));
    }
    doc.push_str("</r>");
    let v = xmlpath::get(&doc, "r.*");
    assert!(v.members().len() <= 10_000);
}

#[test]
fn arbitrary_bytes_never_panic() {
    let junk: Vec<u8> = (0u8..=255).cycle().take(8192).collect();
    let _ = xmlpath::get_bytes(&junk, "a.b.c");
    let _ = xmlpath::get_bytes(b"<<<>>>]]>&&&", "x.*");
    let _ = xmlpath::set_bytes(&junk, "a.b", "v");
    let _ = xmlpath::get(std::str::from_utf8(b"<a><a><a>").unwrap(), "a.a.a");
}

#[test]
fn custom_modifier_registration() {
    xmlpath::register_modifier("shout", |v, _| {
        xmlpath::Value::string(v.as_str().to_uppercase())
    })
    .unwrap();
    assert_eq!(
        xmlpath::get(CATALOG, "catalog.book.title|@shout").as_str(),
        "XML GUIDE"
    );
    assert!(xmlpath::register_modifier("sort", |v, _| v).is_err());
    xmlpath::unregister_modifier("shout").unwrap();
}

#[test]
fn pretty_modifier_uses_configured_indent() {
    let doc = "<r><a>1</a><b><c>2</c></b></r>";
    let opts = Options {
        indent: "    ".to_string(),
        ..Options::default()
    };
    let v = xmlpath::get_with(doc, "r|@pretty", &opts);
    assert!(v.raw().contains("\n    <c>2</c>"));
}

#[test]
fn direct_text_and_cdata() {
    let doc = "<p>before <b>bold</b> after<![CDATA[ <raw> ]]></p>";
    let v = xmlpath::get(doc, "p.%");
    assert_eq!(v.as_str(), "before  after <raw> ");
}
