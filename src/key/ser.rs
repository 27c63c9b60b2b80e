//! serde `Serializer` that builds an `Arg` tree directly.
//!
//! Sequences become `List`, tuples and tuple structs become `Tuple`, maps and
//! structs become `Map` (any key type). Enum variants follow serde_json's
//! externally tagged layout. A value wrapped in [`Unordered`] becomes a
//! `Set`, which hashes independently of iteration order.
//!
//! serde hands a `HashSet` over exactly like a `Vec`, so an unordered
//! collection serialized without the wrapper is hashed in whatever order
//! it iterates.

use serde::ser::{self, Serialize};
use std::fmt;

use super::arg::Arg;

/// Newtype-struct name the serializer treats as "this sequence is a set".
pub(crate) const UNORDERED_TOKEN: &str = "$memocache::private::Unordered";

/// Marks a collection whose iteration order carries no meaning (`HashSet`,
/// a `HashMap` seen as a sequence of pairs, ...). Other serializers see the
/// inner value unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unordered<T>(pub T);

impl<T: Serialize> Serialize for Unordered<T> {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(UNORDERED_TOKEN, &self.0)
    }
}

#[derive(Debug)]
pub struct SerError(String);

impl fmt::Display for SerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SerError {}

impl ser::Error for SerError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        SerError(msg.to_string())
    }
}

pub struct ArgSerializer;

pub fn to_arg<T: Serialize + ?Sized>(value: &T) -> Result<Arg, SerError> {
    value.serialize(ArgSerializer)
}

fn tagged(variant: &str, value: Arg) -> Arg {
    Arg::Map(vec![(Arg::Str(variant.to_string()), value)])
}

impl ser::Serializer for ArgSerializer {
    type Ok = Arg;
    type Error = SerError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = SeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = MapBuilder;

    fn serialize_bool(self, v: bool) -> Result<Arg, SerError> {
        Ok(Arg::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Arg, SerError> {
        Ok(Arg::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Arg, SerError> {
        Ok(Arg::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Arg, SerError> {
        Ok(Arg::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Arg, SerError> {
        Ok(Arg::from(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Arg, SerError> {
        Ok(Arg::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Arg, SerError> {
        Ok(Arg::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Arg, SerError> {
        Ok(Arg::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Arg, SerError> {
        Ok(Arg::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Arg, SerError> {
        Ok(Arg::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Arg, SerError> {
        Ok(Arg::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Arg, SerError> {
        Ok(Arg::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Arg, SerError> {
        Ok(Arg::Str(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Arg, SerError> {
        Ok(Arg::Bytes(v.to_vec()))
    }

    fn serialize_none(self) -> Result<Arg, SerError> {
        Ok(Arg::None)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Arg, SerError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Arg, SerError> {
        Ok(Arg::None)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Arg, SerError> {
        Ok(Arg::None)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Arg, SerError> {
        Ok(Arg::Str(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Arg, SerError> {
        let inner = value.serialize(ArgSerializer)?;
        if name != UNORDERED_TOKEN {
            return Ok(inner);
        }
        match inner {
            Arg::List(items) | Arg::Tuple(items) | Arg::Set(items) => Ok(Arg::Set(items)),
            Arg::Map(pairs) => Ok(Arg::Map(pairs)),
            other => Err(SerError(format!(
                "Unordered wraps a non-collection value: {:?}",
                other
            ))),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Arg, SerError> {
        Ok(tagged(variant, value.serialize(ArgSerializer)?))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, SerError> {
        Ok(SeqBuilder::new(SeqKind::List, len))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, SerError> {
        Ok(SeqBuilder::new(SeqKind::Tuple, Some(len)))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, SerError> {
        Ok(SeqBuilder::new(SeqKind::Tuple, Some(len)))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, SerError> {
        Ok(SeqBuilder::new(SeqKind::Variant(variant), Some(len)))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapBuilder, SerError> {
        Ok(MapBuilder::new(None, len))
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapBuilder, SerError> {
        Ok(MapBuilder::new(None, Some(len)))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<MapBuilder, SerError> {
        Ok(MapBuilder::new(Some(variant), Some(len)))
    }
}

enum SeqKind {
    List,
    Tuple,
    Variant(&'static str),
}

pub struct SeqBuilder {
    kind: SeqKind,
    items: Vec<Arg>,
}

impl SeqBuilder {
    fn new(kind: SeqKind, len: Option<usize>) -> Self {
        Self {
            kind,
            items: Vec::with_capacity(len.unwrap_or(0)),
        }
    }

    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerError> {
        self.items.push(value.serialize(ArgSerializer)?);
        Ok(())
    }

    fn finish(self) -> Arg {
        match self.kind {
            SeqKind::List => Arg::List(self.items),
            SeqKind::Tuple => Arg::Tuple(self.items),
            SeqKind::Variant(variant) => tagged(variant, Arg::Tuple(self.items)),
        }
    }
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Arg;
    type Error = SerError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerError> {
        self.push(value)
    }

    fn end(self) -> Result<Arg, SerError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Arg;
    type Error = SerError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerError> {
        self.push(value)
    }

    fn end(self) -> Result<Arg, SerError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Arg;
    type Error = SerError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerError> {
        self.push(value)
    }

    fn end(self) -> Result<Arg, SerError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleVariant for SeqBuilder {
    type Ok = Arg;
    type Error = SerError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerError> {
        self.push(value)
    }

    fn end(self) -> Result<Arg, SerError> {
        Ok(self.finish())
    }
}

pub struct MapBuilder {
    variant: Option<&'static str>,
    pairs: Vec<(Arg, Arg)>,
    pending_key: Option<Arg>,
}

impl MapBuilder {
    fn new(variant: Option<&'static str>, len: Option<usize>) -> Self {
        Self {
            variant,
            pairs: Vec::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        }
    }

    fn finish(self) -> Arg {
        let map = Arg::Map(self.pairs);
        match self.variant {
            Some(variant) => tagged(variant, map),
            None => map,
        }
    }
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Arg;
    type Error = SerError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), SerError> {
        self.pending_key = Some(key.serialize(ArgSerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| SerError("map value without a key".to_string()))?;
        self.pairs.push((key, value.serialize(ArgSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Arg, SerError> {
        Ok(self.finish())
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Arg;
    type Error = SerError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SerError> {
        self.pairs
            .push((Arg::Str(key.to_string()), value.serialize(ArgSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Arg, SerError> {
        Ok(self.finish())
    }
}

impl ser::SerializeStructVariant for MapBuilder {
    type Ok = Arg;
    type Error = SerError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SerError> {
        ser::SerializeStruct::serialize_field(self, key, value)
    }

    fn end(self) -> Result<Arg, SerError> {
        Ok(self.finish())
    }
}
