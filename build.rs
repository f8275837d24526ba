use std::env;

fn main() {
    if let Ok(v) = env::var("DEP_OPENSSL_VERSION_NUMBER") {
        let version = u64::from_str_radix(&v, 16).unwrap_or_default();

        assert!(
            version >= 0x3000_0000,
            "The openssl crypto engine requires openssl >= 3 (AES-CCM, Brainpool curves)!"
        );
    }
}
