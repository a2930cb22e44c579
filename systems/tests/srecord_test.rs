use wirewrap_systems::srecord::{Record, SRecordError, parse, parse_record};

#[test]
fn test_s1_record_with_valid_checksum() {
    // S1, count 05, address 0x1000, data 12 34.
    // Checksum = 0xFF - ((05+10+00+12+34) & 0xFF) = 0xFF - 0x5B = 0xA4.
    let record = parse_record("S10510001234A4", 1).unwrap().unwrap();
    assert_eq!(
        record,
        Record::Data {
            address: 0x1000,
            bytes: vec![0x12, 0x34],
        }
    );
}

#[test]
fn test_bad_checksum_rejected() {
    let result = parse_record("S10510001234DA", 1);
    let Err(SRecordError::BadChecksum { computed, found, .. }) = result else {
        panic!("expected checksum mismatch");
    };
    assert_eq!(computed, 0xA4);
    assert_eq!(found, 0xDA);
}

#[test]
fn test_specification_sample_record_rejected() {
    // The malformed sample `S1 03 1000 12 34 DA`: its count disagrees
    // with the record length, so it never loads.
    assert!(parse_record("S10310001234DA", 1).is_err());
}

#[test]
fn test_single_data_byte_record() {
    // count 04, addr 0x0038, data 0x21: sum = 0x5D, checksum 0xA2.
    let record = parse_record("S104003821A2", 1).unwrap().unwrap();
    assert_eq!(
        record,
        Record::Data {
            address: 0x0038,
            bytes: vec![0x21],
        }
    );
}

#[test]
fn test_byte_count_below_three_rejected() {
    let result = parse_record("S102FFFE", 1);
    assert!(matches!(result, Err(SRecordError::BadCount { count: 2, .. })));
}

#[test]
fn test_header_and_termination() {
    let records = parse("S00600004844521B\nS10510001234A4\nS9031000EC\n").unwrap();
    assert_eq!(records.len(), 3);
    assert!(matches!(records[0], Record::Header(_)));
    assert_eq!(
        records[1],
        Record::Data {
            address: 0x1000,
            bytes: vec![0x12, 0x34],
        }
    );
    assert!(matches!(records[2], Record::Termination { address: 0x1000 }));
}

#[test]
fn test_unsupported_type_rejected() {
    // A checksum-valid S2 record still has no business here.
    let result = parse_record("S204000000FB", 1);
    assert!(matches!(result, Err(SRecordError::Unsupported { kind: '2', .. })));
}

#[test]
fn test_garbage_rejected() {
    assert!(matches!(
        parse_record("X10510001234A4", 1),
        Err(SRecordError::BadPrefix { .. })
    ));
    assert!(matches!(
        parse_record("S1", 1),
        Err(SRecordError::TooShort { .. })
    ));
    assert!(matches!(
        parse_record("S10510001234 Z", 1),
        Err(SRecordError::BadHex { .. })
    ));
}

#[test]
fn test_blank_lines_skipped() {
    let records = parse("\n\nS10510001234A4\n\n").unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn test_error_reports_line_number() {
    let result = parse("S10510001234A4\nS10510001234DA\n");
    let Err(SRecordError::BadChecksum { line, .. }) = result else {
        panic!("expected checksum mismatch");
    };
    assert_eq!(line, 2);
}
