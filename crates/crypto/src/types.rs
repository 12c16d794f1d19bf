//! Gemeinsame Typen fuer das Kryptografie-Subsystem

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone)]
pub struct SecretBytes(pub Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ergebnis einer erfolgreichen Schluesselaushandlung
///
/// Der Salt wird mitgefuehrt damit die Seite die ihn erzeugt hat
/// (die antwortende) ihn an die Gegenseite uebertragen kann.
#[derive(Debug)]
pub struct AbgeleitetesGeheimnis {
    /// Abgeleitetes symmetrisches Geheimnis (32 Bytes)
    pub schluessel: SecretBytes,
    /// Bei der Extraktion verwendeter Salt (32 Bytes)
    pub salt: [u8; 32],
}
