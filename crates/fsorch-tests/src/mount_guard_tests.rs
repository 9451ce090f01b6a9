//! Delete-blocking scenarios: a filesystem with live mounts never enters
//! teardown.

#[cfg(test)]
mod tests {
    use crate::client::FsClient;
    use crate::harness::fixture;
    use fsorch_control::{ControlError, FilesystemPhase};

    #[tokio::test]
    async fn test_delete_with_mount_is_rejected() {
        let fx = fixture();
        assert_eq!(fx.create_and_activate("testfs").await, FilesystemPhase::Active);

        let mut client = FsClient::new("client-1");
        client.mount(fx.plane.exports(), "testfs").unwrap();

        let err = fx.plane.delete_filesystem("testfs").await;
        assert!(matches!(
            err,
            Err(ControlError::FilesystemInUse { mounts: 1, .. })
        ));
        assert_eq!(fx.phase("testfs").await, Some(FilesystemPhase::Active));
        assert!(!fx.plane.get_filesystem("testfs").await.unwrap().deletion_requested);
    }

    #[tokio::test]
    async fn test_delete_succeeds_after_unmount() {
        let fx = fixture();
        assert_eq!(fx.create_and_activate("testfs").await, FilesystemPhase::Active);

        let mut client = FsClient::new("client-1");
        client.mount(fx.plane.exports(), "testfs").unwrap();
        assert!(fx.plane.delete_filesystem("testfs").await.is_err());

        client.unmount(fx.plane.exports(), "testfs").unwrap();
        assert!(fx.plane.exports().can_delete("testfs"));
        fx.plane.delete_filesystem("testfs").await.unwrap();
        assert_eq!(
            fx.plane.reconcile_to_settled("testfs").await.unwrap(),
            FilesystemPhase::Deleted
        );
    }

    #[tokio::test]
    async fn test_deleting_never_entered_while_mounted() {
        let fx = fixture();
        assert_eq!(fx.create_and_activate("testfs").await, FilesystemPhase::Active);

        // the delete request lands while unmounted...
        fx.plane.delete_filesystem("testfs").await.unwrap();

        // ...but a mount sneaks in before the next pass
        let mut client = FsClient::new("client-1");
        client.mount(fx.plane.exports(), "testfs").unwrap();

        let outcome = fx.plane.reconcile("testfs").await.unwrap();
        assert!(outcome.transition.is_none());
        assert_eq!(fx.phase("testfs").await, Some(FilesystemPhase::Active));

        // once the mount clears, teardown proceeds
        client.unmount(fx.plane.exports(), "testfs").unwrap();
        assert_eq!(
            fx.plane.reconcile_to_settled("testfs").await.unwrap(),
            FilesystemPhase::Deleted
        );
    }

    #[tokio::test]
    async fn test_every_client_must_unmount() {
        let fx = fixture();
        assert_eq!(fx.create_and_activate("testfs").await, FilesystemPhase::Active);

        let mut a = FsClient::new("client-a");
        let mut b = FsClient::new("client-b");
        a.mount(fx.plane.exports(), "testfs").unwrap();
        b.mount(fx.plane.exports(), "testfs").unwrap();

        a.unmount(fx.plane.exports(), "testfs").unwrap();
        let err = fx.plane.delete_filesystem("testfs").await;
        assert!(matches!(
            err,
            Err(ControlError::FilesystemInUse { mounts: 1, .. })
        ));

        b.unmount(fx.plane.exports(), "testfs").unwrap();
        assert!(fx.plane.delete_filesystem("testfs").await.is_ok());
    }

    #[tokio::test]
    async fn test_mount_survives_republish() {
        let fx = fixture();
        assert_eq!(fx.create_and_activate("testfs").await, FilesystemPhase::Active);

        let mut client = FsClient::new("client-1");
        client.mount(fx.plane.exports(), "testfs").unwrap();
        let mounted_version = client.mounted_endpoint("testfs").unwrap().version;

        fx.plane.exports().publish_export("testfs", "node-9:2049");
        assert!(!fx.plane.exports().can_delete("testfs"));
        let current = fx.plane.exports().endpoint("testfs").unwrap();
        assert!(current.version > mounted_version);

        // the client still unmounts cleanly against the new endpoint
        client.unmount(fx.plane.exports(), "testfs").unwrap();
        assert!(fx.plane.exports().can_delete("testfs"));
    }
}
