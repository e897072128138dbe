use fmbridge_ports::types::{BankId, BANK_ID_SIZE};
use pretty_assertions::assert_eq;

#[test]
fn bank_id_bytes_are_percussive_msb_lsb() {
    assert_eq!(BankId::melodic(3, 9).to_bytes(), [0, 3, 9]);
    assert_eq!(BankId::percussion(127, 0).to_bytes(), [1, 127, 0]);
    assert_eq!(BANK_ID_SIZE, 3);
}

#[test]
fn bank_id_bytes_round_trip() {
    for id in [
        BankId::default(),
        BankId::melodic(0, 1),
        BankId::melodic(127, 127),
        BankId::percussion(5, 64),
    ] {
        assert_eq!(BankId::from_bytes(id.to_bytes()), id);
    }
}

#[test]
fn any_nonzero_first_byte_is_percussive() {
    for flag in [1u8, 2, 0x80, 0xFF] {
        let id = BankId::from_bytes([flag, 10, 20]);
        assert_eq!(id, BankId::percussion(10, 20));
        assert_eq!(id.to_bytes(), [1, 10, 20]);
    }
    assert!(!BankId::from_bytes([0, 10, 20]).percussive);
}
