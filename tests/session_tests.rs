//! Concurrency tests for the session key manager.

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use finvault::crypto::DerivedKey;
use finvault::errors::FinVaultError;
use finvault::session::{SessionKeyManager, SessionState};

fn key(byte: u8) -> DerivedKey {
    DerivedKey::from_bytes([byte; 32])
}

#[test]
fn concurrent_readers_see_whole_keys_or_locked() {
    let session = SessionKeyManager::new();
    session.set_key(key(1));

    let writers = 2;
    let readers = 6;
    let barrier = Arc::new(Barrier::new(writers + readers));
    let mut handles = Vec::new();

    for w in 0..writers {
        let session = session.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..500u32 {
                if (i + w as u32) % 3 == 0 {
                    session.clear_key();
                } else {
                    // Keys are uniform bytes, so a torn read would mix values.
                    session.set_key(key(((i % 250) + 1) as u8));
                }
            }
        }));
    }

    for _ in 0..readers {
        let session = session.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..2_000 {
                match session.current_key() {
                    Ok(k) => {
                        let bytes = k.as_bytes();
                        assert!(bytes.iter().all(|b| *b == bytes[0]), "torn key observed");
                        assert_ne!(bytes[0], 0);
                    }
                    Err(FinVaultError::SessionLocked) => {}
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("thread panicked");
    }
}

#[test]
fn clear_during_reads_reports_locked_not_decryption_failure() {
    let session = SessionKeyManager::new();
    session.set_key(key(9));
    let held = session.current_key().expect("unlocked");

    session.clear_key();

    assert_eq!(session.state(), SessionState::Locked);
    assert!(matches!(
        session.current_key(),
        Err(FinVaultError::SessionLocked)
    ));
    // An in-flight reader keeps the key it already fetched.
    assert_eq!(held.as_bytes(), &[9u8; 32]);
}

#[test]
fn lock_unlock_cycles_in_one_test() {
    let session = SessionKeyManager::new();
    for round in 1..=5u8 {
        session.set_key(key(round));
        assert_eq!(*session.current_key().unwrap(), key(round));
        assert!(session.clear_key());
        assert!(session.current_key().is_err());
    }
}

#[test]
fn idle_expiry_never_discards_a_fresh_unlock() {
    let idle = Duration::from_millis(100);
    let session = SessionKeyManager::with_auto_lock(idle);

    for round in 1..=5u8 {
        // Let the previous key go idle so every reader below races to
        // expire it while the writer installs a new one.
        session.set_key(key(round));
        thread::sleep(idle + Duration::from_millis(50));

        let readers = 6;
        let barrier = Arc::new(Barrier::new(readers + 1));
        let mut handles = Vec::new();

        for _ in 0..readers {
            let session = session.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..200 {
                    match session.current_key() {
                        Ok(_) | Err(FinVaultError::SessionLocked) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            }));
        }

        let fresh = round + 100;
        barrier.wait();
        session.set_key(key(fresh));
        let got = session
            .current_key()
            .expect("a key installed just now must not be expired");
        assert_eq!(*got, key(fresh));

        for handle in handles {
            handle.join().expect("thread panicked");
        }
        assert!(session.is_unlocked());
    }
}

#[test]
fn state_follows_idle_timeout_without_access() {
    let session = SessionKeyManager::with_auto_lock(Duration::from_millis(20));
    session.set_key(key(3));
    thread::sleep(Duration::from_millis(60));

    assert_eq!(session.state(), SessionState::Locked);
    assert!(session.lock_if_idle());
    assert!(!session.lock_if_idle());
}
