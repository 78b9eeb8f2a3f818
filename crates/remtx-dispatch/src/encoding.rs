//! Known-objects aware encoder over a [`PersistenceResolver`].

use std::sync::Arc;

use remtx_error::{RemtxError, Result};
use remtx_types::{ActionValue, Lifecycle, ObjectHandle};

use crate::protocol::{EncodedData, IdentityAssignment, KnownObjects, ObjectData, ReferenceData};
use crate::traits::{ObjectEncoder, PersistenceResolver};

/// Encodes each object in full the first time it appears in a request and by
/// reference afterwards. Services are always sent by reference.
pub struct GraphEncoder {
    resolver: Arc<dyn PersistenceResolver>,
}

impl GraphEncoder {
    pub fn new(resolver: Arc<dyn PersistenceResolver>) -> Self {
        Self { resolver }
    }

    fn encode_object(object: &ObjectHandle, known: &mut KnownObjects) -> EncodedData {
        let reference = ReferenceData::of(object);
        if !known.mark_known(reference.oid.clone()) || object.is_service() {
            return EncodedData::Reference(reference);
        }
        EncodedData::Object(ObjectData {
            reference,
            transient: object.lifecycle() == Lifecycle::Transient,
            fields: object.fields(),
        })
    }

    fn decode_object(&self, data: &EncodedData, known: &mut KnownObjects) -> Result<ObjectHandle> {
        match data {
            EncodedData::Reference(reference) => {
                known.mark_known(reference.oid.clone());
                Ok(self.resolver.adopt(reference))
            }
            EncodedData::Object(object) => self.decode_update(object, known),
            other => Err(RemtxError::protocol(format!(
                "expected an object in collection, got {other:?}"
            ))),
        }
    }
}

impl ObjectEncoder for GraphEncoder {
    fn encode_target(
        &self,
        target: &ObjectHandle,
        known: &mut KnownObjects,
    ) -> Result<EncodedData> {
        Ok(Self::encode_object(target, known))
    }

    fn encode_parameter(
        &self,
        value: &ActionValue,
        known: &mut KnownObjects,
    ) -> Result<EncodedData> {
        Ok(match value {
            ActionValue::Null => EncodedData::Null,
            ActionValue::Scalar(text) => EncodedData::Scalar(text.clone()),
            ActionValue::Object(object) => Self::encode_object(object, known),
            ActionValue::Collection(items) => EncodedData::Collection(
                items
                    .iter()
                    .map(|item| Self::encode_object(item, known))
                    .collect(),
            ),
        })
    }

    fn made_persistent(&self, object: &ObjectHandle, identity: &IdentityAssignment) -> Result<()> {
        if object.lifecycle() == Lifecycle::Persistent {
            return Ok(());
        }
        let previous = object.make_persistent(identity.oid.clone(), identity.version);
        tracing::debug!(from = %previous, to = %identity.oid, "object made persistent");
        self.resolver.identity_changed(&previous, object);
        Ok(())
    }

    fn decode(&self, data: &EncodedData, known: &mut KnownObjects) -> Result<ActionValue> {
        match data {
            EncodedData::Null => Ok(ActionValue::Null),
            EncodedData::Scalar(text) => Ok(ActionValue::Scalar(text.clone())),
            EncodedData::Reference(_) | EncodedData::Object(_) => {
                self.decode_object(data, known).map(ActionValue::Object)
            }
            EncodedData::Collection(items) => items
                .iter()
                .map(|item| self.decode_object(item, known))
                .collect::<Result<Vec<_>>>()
                .map(ActionValue::Collection),
        }
    }

    fn decode_update(&self, data: &ObjectData, known: &mut KnownObjects) -> Result<ObjectHandle> {
        let object = self.resolver.adopt(&data.reference);
        object.replace_state(data.fields.clone(), data.reference.version);
        known.mark_known(data.oid().clone());
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use remtx_types::{ObjectId, Version};

    use super::*;
    use crate::testing::MapResolver;

    fn order(oid: &str) -> ObjectHandle {
        ObjectHandle::persistent("Order", ObjectId::new(oid), Version::new(3))
            .with_field("qty", "1")
    }

    fn encoder(resolver: MapResolver) -> (GraphEncoder, Arc<MapResolver>) {
        let resolver = Arc::new(resolver);
        (GraphEncoder::new(resolver.clone()), resolver)
    }

    #[test]
    fn repeated_object_is_sent_by_reference() {
        let (enc, _) = encoder(MapResolver::default());
        let o = order("ORD-1");
        let mut known = KnownObjects::new();

        let first = enc
            .encode_parameter(&ActionValue::Object(o.clone()), &mut known)
            .unwrap();
        let second = enc.encode_target(&o, &mut known).unwrap();

        let EncodedData::Object(data) = first else {
            panic!("first occurrence must be encoded in full");
        };
        assert_eq!(data.fields["qty"], "1");
        assert!(!data.transient);
        assert_eq!(data.reference.version, Some(Version::new(3)));
        assert!(matches!(second, EncodedData::Reference(r) if r.oid.as_str() == "ORD-1"));
    }

    #[test]
    fn collections_share_the_known_set() {
        let (enc, _) = encoder(MapResolver::default());
        let a = order("A");
        let mut known = KnownObjects::new();
        let encoded = enc
            .encode_parameter(&ActionValue::Collection(vec![a.clone(), a]), &mut known)
            .unwrap();
        let EncodedData::Collection(items) = encoded else {
            panic!("expected collection");
        };
        assert!(matches!(items[0], EncodedData::Object(_)));
        assert!(matches!(items[1], EncodedData::Reference(_)));
        assert_eq!(known.len(), 1);
    }

    #[test]
    fn services_are_always_references() {
        let (enc, _) = encoder(MapResolver::default());
        let svc = ObjectHandle::service("Orders", ObjectId::new("svc:orders"));
        let mut known = KnownObjects::new();
        assert!(matches!(
            enc.encode_target(&svc, &mut known).unwrap(),
            EncodedData::Reference(_)
        ));
    }

    #[test]
    fn decoded_update_is_not_re_encoded() {
        let local = order("ORD-1");
        let (enc, _) = encoder(MapResolver::with(&[&local]));
        let mut known = KnownObjects::new();

        let mut fields = std::collections::BTreeMap::new();
        fields.insert("qty".to_owned(), "7".to_owned());
        let update = ObjectData {
            reference: ReferenceData {
                oid: ObjectId::new("ORD-1"),
                type_name: "Order".into(),
                version: Some(Version::new(4)),
            },
            transient: false,
            fields,
        };
        let decoded = enc.decode_update(&update, &mut known).unwrap();
        assert!(decoded.same_object(&local));
        assert_eq!(local.field("qty").as_deref(), Some("7"));
        assert_eq!(local.version(), Some(Version::new(4)));

        let again = enc.encode_target(&local, &mut known).unwrap();
        assert!(matches!(again, EncodedData::Reference(_)));
    }

    #[test]
    fn decode_null_scalar_and_unknown_reference() {
        let (enc, resolver) = encoder(MapResolver::default());
        let mut known = KnownObjects::new();
        let null = enc.decode(&EncodedData::Null, &mut known).unwrap();
        assert!(null.is_null());
        let scalar = EncodedData::Scalar("42".into());
        assert_eq!(
            enc.decode(&scalar, &mut known).unwrap(),
            ActionValue::Scalar("42".into())
        );

        let reference = EncodedData::Reference(ReferenceData {
            oid: ObjectId::new("NEW-1"),
            type_name: "Invoice".into(),
            version: Some(Version::INITIAL),
        });
        let value = enc.decode(&reference, &mut known).unwrap();
        let adopted = value.as_object().unwrap();
        assert_eq!(adopted.type_name(), "Invoice");
        assert!(resolver.resolve(&ObjectId::new("NEW-1")).is_ok());
    }

    #[test]
    fn decode_rejects_nested_scalars_in_collections() {
        let (enc, _) = encoder(MapResolver::default());
        let mut known = KnownObjects::new();
        let err = enc
            .decode(
                &EncodedData::Collection(vec![EncodedData::Scalar("x".into())]),
                &mut known,
            )
            .unwrap_err();
        assert!(matches!(err, RemtxError::Protocol { .. }));
    }

    #[test]
    fn made_persistent_rekeys_the_resolver() {
        let draft = ObjectHandle::transient("Order", ObjectId::new("tmp-1"));
        let (enc, resolver) = encoder(MapResolver::with(&[&draft]));
        let assignment = IdentityAssignment {
            oid: ObjectId::new("ORD-9"),
            version: Version::INITIAL,
        };
        enc.made_persistent(&draft, &assignment).unwrap();
        assert_eq!(draft.oid().as_str(), "ORD-9");
        assert_eq!(draft.lifecycle(), Lifecycle::Persistent);
        assert!(resolver.resolve(&ObjectId::new("ORD-9")).is_ok());
        assert!(resolver.resolve(&ObjectId::new("tmp-1")).is_err());

        // Already persistent: untouched.
        let again = IdentityAssignment {
            oid: ObjectId::new("ORD-10"),
            version: Version::new(5),
        };
        enc.made_persistent(&draft, &again).unwrap();
        assert_eq!(draft.oid().as_str(), "ORD-9");
    }
}
