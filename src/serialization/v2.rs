use crate::caveat::{Caveat, CaveatBuilder};
use crate::error::MacaroonError;
use crate::serialization::macaroon_builder::MacaroonBuilder;
use crate::{ByteString, Macaroon, Result};

const VERSION: u8 = 2;

const EOS_V2: u8 = 0;
const LOCATION_V2: u8 = 1;
const IDENTIFIER_V2: u8 = 2;
const VID_V2: u8 = 4;
const SIGNATURE_V2: u8 = 6;

fn encode_varint(mut value: usize, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn serialize_field(tag: u8, value: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    encode_varint(value.len(), out);
    out.extend_from_slice(value);
}

fn pack(macaroon: &Macaroon) -> Vec<u8> {
    let mut packed: Vec<u8> = vec![VERSION];

    if let Some(location) = macaroon.location() {
        serialize_field(LOCATION_V2, location.as_bytes(), &mut packed);
    }
    serialize_field(IDENTIFIER_V2, &macaroon.identifier().0, &mut packed);
    packed.push(EOS_V2);

    for caveat in macaroon.caveats() {
        match caveat {
            Caveat::FirstParty(fp) => {
                serialize_field(IDENTIFIER_V2, &fp.predicate().0, &mut packed);
            }
            Caveat::ThirdParty(tp) => {
                serialize_field(LOCATION_V2, tp.location().as_bytes(), &mut packed);
                serialize_field(IDENTIFIER_V2, &tp.id().0, &mut packed);
                serialize_field(VID_V2, &tp.verifier_id().0, &mut packed);
            }
        }
        packed.push(EOS_V2);
    }
    packed.push(EOS_V2);

    serialize_field(SIGNATURE_V2, macaroon.signature().as_ref(), &mut packed);
    packed
}

pub fn serialize(macaroon: &Macaroon) -> Result<Vec<u8>> {
    let packed = pack(macaroon);
    Ok(base64::encode_config(&packed, base64::URL_SAFE_NO_PAD).into_bytes())
}

struct Reader<'r> {
    data: &'r [u8],
    pos: usize,
}

impl<'r> Reader<'r> {
    fn new(data: &'r [u8]) -> Reader<'r> {
        Reader { data, pos: 0 }
    }

    fn get_byte(&mut self) -> Result<u8> {
        if self.pos >= self.data.len() {
            return Err(MacaroonError::DeserializationError(String::from(
                "unexpected end of input",
            )));
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or_else(|| {
            MacaroonError::DeserializationError(String::from("unexpected end of input"))
        })
    }

    fn get_eos(&mut self) -> Result<bool> {
        if self.peek_byte()? == EOS_V2 {
            self.pos += 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn get_tag(&mut self) -> Result<u8> {
        self.get_byte()
    }

    fn get_varint(&mut self) -> Result<usize> {
        let mut value: usize = 0;
        let mut shift: usize = 0;
        loop {
            let byte = self.get_byte()?;
            value |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(value)
    }

    fn get_field(&mut self, expected_tag: u8) -> Result<Vec<u8>> {
        let tag = self.get_tag()?;
        if tag != expected_tag {
            return Err(MacaroonError::DeserializationError(format!(
                "expected tag {}, found {}",
                expected_tag, tag
            )));
        }
        let size = self.get_varint()?;
        if self.pos + size > self.data.len() {
            return Err(MacaroonError::DeserializationError(String::from(
                "field size exceeds remaining input",
            )));
        }
        let value = self.data[self.pos..self.pos + size].to_vec();
        self.pos += size;
        Ok(value)
    }
}

pub fn deserialize(data: &[u8]) -> Result<Macaroon> {
    let mut reader = Reader::new(data);
    let version = reader.get_byte()?;
    if version != VERSION {
        return Err(MacaroonError::DeserializationError(format!(
            "unsupported v2 version byte {}",
            version
        )));
    }

    let mut builder = MacaroonBuilder::new();

    if reader.peek_byte()? == LOCATION_V2 {
        let location = reader.get_field(LOCATION_V2)?;
        builder.set_location(&String::from_utf8(location)?);
    }
    let identifier = reader.get_field(IDENTIFIER_V2)?;
    builder.set_identifier(ByteString(identifier));
    if !reader.get_eos()? {
        return Err(MacaroonError::DeserializationError(String::from(
            "expected EOS after identifier",
        )));
    }

    loop {
        if reader.get_eos()? {
            break;
        }
        let mut caveat_builder = CaveatBuilder::new();
        if reader.peek_byte()? == LOCATION_V2 {
            let location = reader.get_field(LOCATION_V2)?;
            caveat_builder.add_location(String::from_utf8(location)?);
        }
        let id = reader.get_field(IDENTIFIER_V2)?;
        caveat_builder.add_id(ByteString(id));
        if reader.peek_byte()? == VID_V2 {
            let vid = reader.get_field(VID_V2)?;
            caveat_builder.add_verifier_id(ByteString(vid));
        }
        if !reader.get_eos()? {
            return Err(MacaroonError::DeserializationError(String::from(
                "expected EOS after caveat",
            )));
        }
        builder.add_caveat(caveat_builder.build()?);
    }

    let signature = reader.get_field(SIGNATURE_V2)?;
    if signature.len() != 32 {
        return Err(MacaroonError::DeserializationError(String::from(
            "illegal signature length",
        )));
    }
    builder.set_signature(&signature);

    builder.build()
}

#[cfg(test)]
mod tests {
    use crate::{Caveat, Macaroon, MacaroonKey};

    const SERIALIZED: &str = "AgETaHR0cDovL2V4YW1wbGUub3JnLwIFa2V5aWQAAhRhY2NvdW50ID0gMzczNTkyODU1OQACDHVzZXIgPSBhbGljZQAABiBL6WfNHqDGsmuvakqU7psFsViG2guoXoxCqTyNDhJe_A==";
    const SIGNATURE: [u8; 32] = [
        75, 233, 103, 205, 30, 160, 198, 178, 107, 175, 106, 74, 148, 238, 155, 5, 177, 88, 134,
        218, 11, 168, 94, 140, 66, 169, 60, 141, 14, 18, 94, 252,
    ];

    #[test]
    fn test_deserialize_v2() {
        let decoded = base64::decode_config(SERIALIZED, base64::URL_SAFE).unwrap();
        let macaroon = super::deserialize(&decoded).unwrap();
        assert_eq!("http://example.org/", &macaroon.location().unwrap());
        assert_eq!("keyid", macaroon.identifier());
        assert_eq!(2, macaroon.caveats().len());
        let predicate = match &macaroon.caveats()[0] {
            Caveat::FirstParty(fp) => fp.predicate(),
            _ => panic!("expected first-party caveat"),
        };
        assert_eq!("account = 3735928559", predicate);
        assert_eq!(SIGNATURE, macaroon.signature().0);
    }

    #[test]
    fn test_serialize_deserialize_v2() {
        let key = MacaroonKey::generate(b"key");
        let mut macaroon =
            Macaroon::create(Some("http://example.org/".into()), &key, "keyid".into()).unwrap();
        macaroon.add_first_party_caveat("account = 3735928559".into());
        macaroon.add_third_party_caveat(
            "https://auth.mybank.com/",
            &MacaroonKey::generate(b"my key"),
            "caveat".into(),
        );
        let packed = super::pack(&macaroon);
        let deserialized = super::deserialize(&packed).unwrap();
        assert_eq!(macaroon, deserialized);
    }
}
