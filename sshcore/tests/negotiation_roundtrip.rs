use cryptovec::CryptoVec;
use sshcore::negotiation::{read_kex, write_kex, Preferred};

#[test]
fn write_kex_then_read_kex_picks_our_top_choices() {
    let mut buf = CryptoVec::new();
    write_kex(&Preferred::DEFAULT, &mut buf);

    let names = read_kex(&buf, &Preferred::DEFAULT, false).unwrap();

    assert_eq!(names.kex.0, Preferred::DEFAULT.kex[0].0);
    assert_eq!(names.key, Preferred::DEFAULT.key[0]);
    assert_eq!(names.cipher, Preferred::DEFAULT.cipher[0]);
    assert_eq!(names.mac, Preferred::DEFAULT.mac[0]);
    assert_eq!(names.client_compression, Preferred::DEFAULT.compression[0]);
    assert_eq!(names.server_compression, Preferred::DEFAULT.compression[0]);
    assert!(!names.ignore_guessed, "we never set first_kex_packet_follows");
}

#[test]
fn buggy_mac_substitute_list_wins_when_flagged() {
    let mut buf = CryptoVec::new();
    write_kex(&Preferred::DEFAULT, &mut buf);

    let names = read_kex(&buf, &Preferred::DEFAULT, true).unwrap();
    assert_eq!(names.mac, "hmac-md5");
}
