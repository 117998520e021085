//! End-to-end parsing scenarios over in-memory files: minimal files,
//! revision chains, hybrid xref data, compressed object streams, repair
//! paths and concurrent lookups.

use ferropdf::{
    Crypter, CrypterFactory, ParseError, ParseOptions, ParseResult, PdfDictionary, PdfObject,
    PdfParser, PdfReference, PdfVersion,
};
use std::io::Cursor;
use std::sync::Arc;

fn open(data: Vec<u8>) -> PdfParser<Cursor<Vec<u8>>> {
    PdfParser::new(Cursor::new(data)).unwrap()
}

fn be2(v: usize) -> [u8; 2] {
    [(v >> 8) as u8, v as u8]
}

/// One object, one xref table, optional extra trailer entries.
fn build_single_object_pdf(trailer_extra: &str) -> Vec<u8> {
    let mut out = b"%PDF-1.4\n".to_vec();
    let obj_off = out.len();
    out.extend_from_slice(b"1 0 obj\n(hello)\nendobj\n");
    let xref_off = out.len();
    out.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
    out.extend_from_slice(format!("{obj_off:010} 00000 n \n").as_bytes());
    out.extend_from_slice(
        format!("trailer\n<</Size 2/Root 1 0 R{trailer_extra}>>\n").as_bytes(),
    );
    out.extend_from_slice(format!("startxref\n{xref_off}\n%%EOF\n").as_bytes());
    out
}

#[test]
fn s1_minimal_valid_file() {
    // Literal fixture, including its slightly-off startxref offset;
    // the tolerant xref line loop still finds the subsections.
    let data = b"%PDF-1.4\n1 0 obj null endobj\nxref\n0 2\n0000000000 65535 f\n0000000009 00000 n\ntrailer <</Size 2/Root 1 0 R>>\nstartxref\n25\n%%EOF";
    let parser = open(data.to_vec());
    assert_eq!(parser.version(), PdfVersion::new(1, 4));

    let obj = parser.lookup_by_number(1).unwrap();
    match obj.as_ref() {
        PdfObject::Indirect(io) => {
            assert_eq!((io.object_number, io.generation), (1, 0));
            assert!(io.object.is_null());
        }
        other => panic!("expected indirect null, got {other:?}"),
    }
}

#[test]
fn s3_invalid_prev_keeps_primary_revision() {
    let parser = open(build_single_object_pdf("/Prev /Invalid"));
    assert_eq!(parser.indexed_object_numbers(), vec![1]);
    let obj = parser.lookup_by_number(1).unwrap();
    assert!(matches!(obj.as_ref(), PdfObject::Indirect(_)));
}

#[test]
fn s4_trace_of_undefined_and_negative_numbers_yields_null() {
    let parser = open(build_single_object_pdf(""));
    for object_number in [-1, 0, 77] {
        let traced = parser
            .trace(&PdfObject::Reference(PdfReference {
                object_number,
                generation: 0,
            }))
            .unwrap();
        assert!(traced.is_null(), "object {object_number} should trace to null");
    }
}

#[test]
fn s5_xref_stream_with_ascii_prev() {
    let mut out = b"%PDF-1.5\n".to_vec();
    let off_old = out.len();
    out.extend_from_slice(b"1 0 obj\n(old)\nendobj\n");
    let off_new = out.len();
    out.extend_from_slice(b"1 0 obj\n(new)\nendobj\n");
    let off_three = out.len();
    out.extend_from_slice(b"3 0 obj\n33\nendobj\n");

    let ascii_off = out.len();
    out.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
    out.extend_from_slice(format!("{off_old:010} 00000 n \n").as_bytes());
    out.extend_from_slice(b"3 1\n");
    out.extend_from_slice(format!("{off_three:010} 00000 n \n").as_bytes());
    out.extend_from_slice(b"trailer\n<</Size 4>>\n");

    let stream_off = out.len();
    let mut records = Vec::new();
    records.push(1);
    records.extend_from_slice(&be2(off_new));
    records.push(0);
    records.push(1);
    records.extend_from_slice(&be2(stream_off));
    records.push(0);
    out.extend_from_slice(
        format!(
            "2 0 obj\n<</Type /XRef /Size 4 /W [1 2 1] /Index [1 2] /Prev {ascii_off} /Length {}>>\nstream\n",
            records.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&records);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    out.extend_from_slice(format!("startxref\n{stream_off}\n%%EOF\n").as_bytes());

    let parser = open(out);
    // Union of both revisions.
    assert_eq!(parser.indexed_object_numbers(), vec![1, 2, 3]);

    // The stream revision overrides the ASCII one on collision.
    let one = parser.lookup_by_number(1).unwrap();
    match one.as_ref() {
        PdfObject::Indirect(io) => {
            assert_eq!(io.object.as_string().unwrap().as_bytes(), b"new")
        }
        other => panic!("expected indirect string, got {other:?}"),
    }

    // Object 3 only exists in the older ASCII revision.
    let three = parser.lookup_by_number(3).unwrap();
    match three.as_ref() {
        PdfObject::Indirect(io) => assert_eq!(io.object.as_integer(), Some(33)),
        other => panic!("expected indirect integer, got {other:?}"),
    }

    // The xref stream object itself resolves as a stream.
    assert!(parser.lookup_by_number(2).unwrap().as_stream().is_some());
}

#[test]
fn s6_compressed_object_round_trip() {
    let mut out = b"%PDF-1.5\n".to_vec();
    let off_objstm = out.len();
    let payload = b"39 0 40 2 41 4 42 6\n7 8 9 (pay)";
    out.extend_from_slice(
        format!(
            "10 0 obj\n<</Type /ObjStm /N 4 /First 20 /Length {}>>\nstream\n",
            payload.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    let off_xref = out.len();
    let mut records = Vec::new();
    records.push(1);
    records.extend_from_slice(&be2(off_objstm));
    records.push(0);
    records.push(2);
    records.extend_from_slice(&be2(10));
    records.push(3);
    out.extend_from_slice(
        format!(
            "11 0 obj\n<</Type /XRef /Size 43 /W [1 2 1] /Index [10 1 42 1] /Length {}>>\nstream\n",
            records.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&records);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    out.extend_from_slice(format!("startxref\n{off_xref}\n%%EOF\n").as_bytes());

    let parser = open(out);

    // Object 42 lives in object stream 10 at index 3.
    let obj = parser.lookup_by_number(42).unwrap();
    match obj.as_ref() {
        PdfObject::Indirect(io) => {
            assert_eq!((io.object_number, io.generation), (42, 0));
            assert_eq!(io.object.as_string().unwrap().as_bytes(), b"pay");
        }
        other => panic!("expected indirect member, got {other:?}"),
    }

    // Members resolve through references too.
    let traced = parser
        .trace(&PdfObject::Reference(PdfReference {
            object_number: 39,
            generation: 0,
        }))
        .unwrap();
    assert_eq!(traced.as_integer(), Some(7));
}

#[test]
fn hybrid_table_with_xrefstm_entry() {
    let mut out = b"%PDF-1.5\n".to_vec();
    let off_one = out.len();
    out.extend_from_slice(b"1 0 obj\n(table)\nendobj\n");
    let off_two = out.len();
    out.extend_from_slice(b"2 0 obj\n(stm)\nendobj\n");

    // The auxiliary xref stream indexes object 2.
    let stm_off = out.len();
    let mut records = Vec::new();
    records.push(1);
    records.extend_from_slice(&be2(off_two));
    records.push(0);
    out.extend_from_slice(
        format!(
            "3 0 obj\n<</Type /XRef /Size 4 /W [1 2 1] /Index [2 1] /Length {}>>\nstream\n",
            records.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&records);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    let table_off = out.len();
    out.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
    out.extend_from_slice(format!("{off_one:010} 00000 n \n").as_bytes());
    out.extend_from_slice(format!("trailer\n<</Size 4/XRefStm {stm_off}>>\n").as_bytes());
    out.extend_from_slice(format!("startxref\n{table_off}\n%%EOF\n").as_bytes());

    let parser = open(out);
    assert_eq!(parser.indexed_object_numbers(), vec![1, 2]);
    let two = parser.lookup_by_number(2).unwrap();
    match two.as_ref() {
        PdfObject::Indirect(io) => assert_eq!(io.object.as_string().unwrap().as_bytes(), b"stm"),
        other => panic!("expected indirect string, got {other:?}"),
    }
}

#[test]
fn lookup_rebuilds_when_offsets_are_stale() {
    let mut out = b"%PDF-1.4\n".to_vec();
    out.extend_from_slice(b"1 0 obj\n(one)\nendobj\n");
    let off_two = out.len();
    out.extend_from_slice(b"2 0 obj\n(two)\nendobj\n");
    let xref_off = out.len();
    out.extend_from_slice(b"xref\n0 3\n0000000000 65535 f \n");
    // Object 1's entry wrongly points at object 2.
    out.extend_from_slice(format!("{off_two:010} 00000 n \n").as_bytes());
    out.extend_from_slice(format!("{off_two:010} 00000 n \n").as_bytes());
    out.extend_from_slice(b"trailer\n<</Size 3>>\n");
    out.extend_from_slice(format!("startxref\n{xref_off}\n%%EOF\n").as_bytes());

    let parser = open(out);
    let one = parser.lookup_by_number(1).unwrap();
    match one.as_ref() {
        PdfObject::Indirect(io) => {
            assert_eq!(io.object_number, 1);
            assert_eq!(io.object.as_string().unwrap().as_bytes(), b"one");
        }
        other => panic!("expected repaired object, got {other:?}"),
    }
    // The rebuilt index also serves the other objects.
    let two = parser.lookup_by_number(2).unwrap();
    match two.as_ref() {
        PdfObject::Indirect(io) => {
            assert_eq!(io.object.as_string().unwrap().as_bytes(), b"two")
        }
        other => panic!("expected indirect string, got {other:?}"),
    }
}

#[test]
fn startxref_beyond_file_is_repaired_locally() {
    let mut out = b"%PDF-1.4\n".to_vec();
    let obj_off = out.len();
    out.extend_from_slice(b"1 0 obj\n(x)\nendobj\n");
    out.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
    out.extend_from_slice(format!("{obj_off:010} 00000 n \n").as_bytes());
    out.extend_from_slice(b"trailer\n<</Size 2>>\n");
    out.extend_from_slice(b"startxref\n99999999\n%%EOF\n");

    let parser = open(out);
    assert_eq!(parser.indexed_object_numbers(), vec![1]);
}

#[test]
fn startxref_pointing_at_garbage_seeks_marker() {
    let mut out = b"%PDF-1.4\n".to_vec();
    let obj_off = out.len();
    out.extend_from_slice(b"1 0 obj\n(x)\nendobj\n");
    out.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
    out.extend_from_slice(format!("{obj_off:010} 00000 n \n").as_bytes());
    let trailer_off = out.len();
    out.extend_from_slice(b"trailer\n<</Size 2>>\n");
    out.extend_from_slice(format!("startxref\n{trailer_off}\n%%EOF\n").as_bytes());

    let parser = open(out);
    assert_eq!(parser.indexed_object_numbers(), vec![1]);
    assert!(parser.lookup_by_number(1).unwrap().as_ref().as_dict().is_none());
}

#[test]
fn trace_rejects_two_deep_indirection() {
    let mut out = b"%PDF-1.4\n".to_vec();
    let off_two = out.len();
    out.extend_from_slice(b"2 0 obj\n3 0 R\nendobj\n");
    let off_three = out.len();
    out.extend_from_slice(b"3 0 obj\n7\nendobj\n");
    let xref_off = out.len();
    out.extend_from_slice(b"xref\n0 1\n0000000000 65535 f \n2 1\n");
    out.extend_from_slice(format!("{off_two:010} 00000 n \n").as_bytes());
    out.extend_from_slice(b"3 1\n");
    out.extend_from_slice(format!("{off_three:010} 00000 n \n").as_bytes());
    out.extend_from_slice(b"trailer\n<</Size 4>>\n");
    out.extend_from_slice(format!("startxref\n{xref_off}\n%%EOF\n").as_bytes());

    let parser = open(out);
    let err = parser
        .trace(&PdfObject::Reference(PdfReference {
            object_number: 2,
            generation: 0,
        }))
        .unwrap_err();
    assert!(matches!(err, ParseError::Recursion(_)), "got {err:?}");
}

#[test]
fn every_indexed_object_resolves_to_its_own_number() {
    let parser = open(build_many_objects(12));
    for n in parser.indexed_object_numbers() {
        let obj = parser.lookup_by_number(n).unwrap();
        match obj.as_ref() {
            PdfObject::Indirect(io) => assert_eq!(io.object_number, n),
            PdfObject::Stream(s) => assert_eq!(s.object_number, n),
            other => panic!("object {n} resolved to {other:?}"),
        }
    }
}

fn build_many_objects(count: usize) -> Vec<u8> {
    let mut out = b"%PDF-1.7\n".to_vec();
    let mut offsets = Vec::new();
    for i in 1..=count {
        offsets.push(out.len());
        out.extend_from_slice(format!("{i} 0 obj\n(value {i})\nendobj\n").as_bytes());
    }
    let xref_off = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", count + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for off in &offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(format!("trailer\n<</Size {}>>\n", count + 1).as_bytes());
    out.extend_from_slice(format!("startxref\n{xref_off}\n%%EOF\n").as_bytes());
    out
}

#[test]
fn concurrent_lookups_match_serial_results() {
    let count = 16;
    let parser = open(build_many_objects(count));

    // Serial baseline.
    let baseline: Vec<PdfObject> = (1..=count as i64)
        .map(|n| parser.lookup_by_number(n).unwrap().as_ref().clone())
        .collect();

    let fresh = open(build_many_objects(count));
    std::thread::scope(|scope| {
        for worker in 0..4 {
            let fresh = &fresh;
            let baseline = &baseline;
            scope.spawn(move || {
                // Different workers walk the objects in different orders.
                for step in 0..count {
                    let idx = (step * 7 + worker * 3) % count;
                    let n = idx as i64 + 1;
                    let obj = fresh.lookup_by_number(n).unwrap();
                    assert_eq!(obj.as_ref(), &baseline[idx]);
                }
            });
        }
    });
}

// --- encryption collaborator wiring -------------------------------------

struct XorCrypter;

impl Crypter for XorCrypter {
    fn is_decrypted(&self, obj: &PdfObject) -> bool {
        // Strings carrying the marker prefix still need decryption.
        match obj {
            PdfObject::Indirect(io) => match io.object.as_ref() {
                PdfObject::LiteralString(s) => !s.as_bytes().starts_with(b"enc:"),
                _ => true,
            },
            _ => true,
        }
    }

    fn decrypt(
        &self,
        obj: &mut PdfObject,
        _object_number: i64,
        _generation: i64,
    ) -> ParseResult<()> {
        if let PdfObject::Indirect(io) = obj {
            if let PdfObject::LiteralString(s) = io.object.as_mut() {
                if let Some(stripped) = s.as_bytes().strip_prefix(b"enc:") {
                    *s = ferropdf::PdfString::new(stripped.to_vec());
                }
            }
        }
        Ok(())
    }

    fn authenticate(&self, password: &[u8]) -> ParseResult<bool> {
        Ok(password == b"owner")
    }
}

struct XorCrypterFactory;

impl CrypterFactory for XorCrypterFactory {
    fn make(
        &self,
        encrypt_dict: &PdfDictionary,
        _trailer: &PdfDictionary,
    ) -> ParseResult<Box<dyn Crypter>> {
        assert_eq!(
            encrypt_dict.get("Filter").and_then(|o| o.as_name()).map(|n| n.as_str()),
            Some("Standard")
        );
        Ok(Box::new(XorCrypter))
    }
}

fn build_encrypted_pdf() -> Vec<u8> {
    let mut out = b"%PDF-1.6\n".to_vec();
    let off_one = out.len();
    out.extend_from_slice(b"1 0 obj\n(enc:secret)\nendobj\n");
    let off_nine = out.len();
    out.extend_from_slice(b"9 0 obj\n<</Filter /Standard/V 1>>\nendobj\n");
    let xref_off = out.len();
    out.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
    out.extend_from_slice(format!("{off_one:010} 00000 n \n").as_bytes());
    out.extend_from_slice(b"9 1\n");
    out.extend_from_slice(format!("{off_nine:010} 00000 n \n").as_bytes());
    out.extend_from_slice(b"trailer\n<</Size 10/Root 1 0 R/Encrypt 9 0 R>>\n");
    out.extend_from_slice(format!("startxref\n{xref_off}\n%%EOF\n").as_bytes());
    out
}

#[test]
fn encryption_hooks_construct_and_apply_the_crypter() {
    let options = ParseOptions {
        crypter_factory: Some(Arc::new(XorCrypterFactory)),
        ..Default::default()
    };
    let parser =
        PdfParser::with_options(Cursor::new(build_encrypted_pdf()), options).unwrap();

    assert!(parser.is_encrypted().unwrap());
    assert!(!parser.decrypt(b"wrong").unwrap());
    assert!(parser.decrypt(b"owner").unwrap());

    let obj = parser.lookup_by_number(1).unwrap();
    match obj.as_ref() {
        PdfObject::Indirect(io) => {
            assert_eq!(io.object.as_string().unwrap().as_bytes(), b"secret")
        }
        other => panic!("expected decrypted string, got {other:?}"),
    }
}

#[test]
fn encrypted_file_without_factory_still_reports_encryption() {
    let parser = open(build_encrypted_pdf());
    assert!(parser.is_encrypted().unwrap());
    // No factory installed, so no crypter exists to authenticate with.
    assert!(parser.decrypt(b"owner").is_err());
}
